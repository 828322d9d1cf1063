use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::info;

use crate::catalog::{CatalogProvider, CatalogSource, FileCatalogSource, HttpCatalogSource};
use crate::clock::{Clock, SystemClock};
use crate::config::{CatalogLocation, ResolvedConfig};
use crate::domain::{BatchConfig, SpecimenRecord};
use crate::download::{
    BandwidthDownload, DownloadArtifact, batch_artifact, bulk_artifact, parse_size_bytes,
    single_format_artifact, start_download,
};
use crate::error::CatalogError;
use crate::export::{ExportReport, rewrite_tree};
use crate::generator::{RandomSource, ScanGenerator};
use crate::progress::ScanStep;
use crate::scan::{ScanHandle, ScanRunner};
use crate::search::{self, ALL_CATEGORIES};
use crate::session::{ScanBatch, ScanSession, ScannerStatus, SessionState};
use crate::store::{FileStore, KeyValueStore};
use crate::timer::{CancelToken, Scheduler, ThreadScheduler};

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub category: String,
    pub total: usize,
    pub matched: usize,
    pub categories: Vec<String>,
    pub tag_suggestions: Vec<String>,
    pub records: Vec<SpecimenRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecimenDetail {
    pub record: SpecimenRecord,
    pub doi_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub batch: ScanBatch,
    pub total_size_gb: String,
    pub scan_time: String,
    pub estimated_minutes: u32,
}

impl ScanResult {
    fn from_batch(batch: ScanBatch) -> Self {
        let (total_size_gb, scan_time) = match &batch.output {
            Some(output) => (output.total_size_display(), output.scan_time_display()),
            None => (format!("{:.2}", batch.config.total_size_gb()), String::new()),
        };
        Self {
            estimated_minutes: batch.config.estimated_minutes(),
            total_size_gb,
            scan_time,
            batch,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResult {
    pub scanner_model: String,
    pub scanner_status: ScannerStatus,
    pub batches: Vec<ScanBatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub sample_id: String,
    pub files: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub formats: Vec<String>,
    pub out_dir: Utf8PathBuf,
    pub simulate_mbps: Option<f64>,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Message(String),
    Started {
        batch_id: String,
        config: BatchConfig,
        total_steps: usize,
    },
    Step {
        step: ScanStep,
        step_index: usize,
        completed_steps: usize,
        total_steps: usize,
        percent: f64,
    },
    Completed {
        batch: Box<ScanBatch>,
    },
    Download {
        label: String,
        percent: f64,
    },
    DownloadCompleted {
        label: String,
    },
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct App {
    config: ResolvedConfig,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    catalog: CatalogProvider,
    session: Arc<Mutex<ScanSession>>,
    runner: ScanRunner,
}

impl App {
    pub fn new(
        config: ResolvedConfig,
        source: Box<dyn CatalogSource>,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let catalog =
            CatalogProvider::new(source, clock.clone()).with_options(config.latency);
        let session = Arc::new(Mutex::new(ScanSession::with_storage(
            clock.clone(),
            storage,
            config.history_limit,
        )));
        let runner = ScanRunner::new(
            session.clone(),
            ScanGenerator::new(clock.clone()),
            scheduler.clone(),
        )
        .with_tick(Duration::from_millis(config.scan_tick_ms));
        Self {
            config,
            clock,
            scheduler,
            catalog,
            session,
            runner,
        }
    }

    pub fn from_config(config: ResolvedConfig) -> Result<Self, CatalogError> {
        let source: Box<dyn CatalogSource> = match &config.catalog_location {
            CatalogLocation::Directory(root) => Box::new(FileCatalogSource::new(root.clone())),
            CatalogLocation::Http(base_url) => Box::new(HttpCatalogSource::new(base_url)?),
        };
        let storage = match &config.storage_dir {
            Some(dir) => FileStore::with_root(dir.clone()),
            None => FileStore::new()?,
        };
        Ok(Self::new(
            config,
            source,
            Arc::new(storage),
            Arc::new(SystemClock),
            Arc::new(ThreadScheduler),
        ))
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn session(&self) -> Arc<Mutex<ScanSession>> {
        self.session.clone()
    }

    pub fn search(
        &self,
        query: &str,
        category: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<SearchResult, CatalogError> {
        let category = category.unwrap_or(ALL_CATEGORIES);
        sink.event(ProgressEvent::Message(format!(
            "loading catalog {}",
            self.config.catalog_url
        )));
        let records = self.catalog.load(&self.config.catalog_url)?;
        let matched: Vec<SpecimenRecord> = search::filter(&records, query, category)
            .into_iter()
            .cloned()
            .collect();
        Ok(SearchResult {
            query: query.to_string(),
            category: category.to_string(),
            total: records.len(),
            matched: matched.len(),
            categories: search::rock_type_categories(&records),
            tag_suggestions: search::tag_suggestions(&records),
            records: matched,
        })
    }

    pub fn show(&self, id: &str, sink: &dyn ProgressSink) -> Result<SpecimenDetail, CatalogError> {
        sink.event(ProgressEvent::Message(format!("looking up specimen {id}")));
        let record = self.catalog.find(&self.config.catalog_url, id)?;
        Ok(SpecimenDetail {
            doi_url: record.doi_url(),
            record,
        })
    }

    pub fn start_scan(
        &self,
        config: BatchConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<ScanHandle, CatalogError> {
        self.start_scan_with_rng(config, Box::new(StdRng::from_os_rng()), sink)
    }

    pub fn start_scan_with_rng(
        &self,
        config: BatchConfig,
        rng: Box<dyn RandomSource + Send>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<ScanHandle, CatalogError> {
        self.runner.start(config, rng, sink)
    }

    pub fn scan(
        &self,
        config: BatchConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<ScanResult, CatalogError> {
        let handle = self.start_scan(config, sink)?;
        handle.wait().map(ScanResult::from_batch)
    }

    pub fn scan_result(batch: ScanBatch) -> ScanResult {
        ScanResult::from_batch(batch)
    }

    pub fn reset_scan(&self) -> Result<SessionState, CatalogError> {
        let mut session = self.session.lock().map_err(|_| CatalogError::SessionPoisoned)?;
        session.reset_scan();
        Ok(session.state())
    }

    pub fn history(&self) -> Result<HistoryResult, CatalogError> {
        let session = self.session.lock().map_err(|_| CatalogError::SessionPoisoned)?;
        Ok(HistoryResult {
            scanner_model: session.scanner_model().to_string(),
            scanner_status: session.scanner_status(),
            batches: session.history().cloned().collect(),
        })
    }

    pub fn download(
        &self,
        id: &str,
        options: DownloadOptions,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<DownloadResult, CatalogError> {
        let record = self.catalog.find(&self.config.catalog_url, id)?;
        let selected: Vec<String> = if options.formats.is_empty() {
            record
                .file_formats
                .iter()
                .map(|format| format.name.clone())
                .collect()
        } else {
            options.formats.clone()
        };
        let artifact = match selected.as_slice() {
            [single] => single_format_artifact(&record, single)?,
            [] => {
                return Err(CatalogError::UnknownFormat {
                    sample: record.id.clone(),
                    format: "<none>".to_string(),
                });
            }
            _ => bulk_artifact(&record, &selected, self.clock.now())?,
        };

        if let Some(mbps) = options.simulate_mbps {
            self.simulate_transfer(&record, &selected, &artifact, mbps, &options.cancel, sink.clone())?;
        }
        let path = artifact.write_to(&options.out_dir)?;
        sink.event(ProgressEvent::Message(format!("saved {path}")));
        Ok(DownloadResult {
            sample_id: record.id,
            files: vec![path],
        })
    }

    pub fn export_batch(&self, batch_id: &str, out_dir: &Utf8Path) -> Result<Utf8PathBuf, CatalogError> {
        let batch = {
            let session = self.session.lock().map_err(|_| CatalogError::SessionPoisoned)?;
            session
                .history()
                .find(|batch| batch.id == batch_id)
                .cloned()
                .ok_or_else(|| CatalogError::BatchNotFound(batch_id.to_string()))?
        };
        batch_artifact(&batch)?.write_to(out_dir)
    }

    pub fn fix_export_paths(&self, root: &Utf8Path) -> Result<ExportReport, CatalogError> {
        rewrite_tree(root)
    }

    fn simulate_transfer(
        &self,
        record: &SpecimenRecord,
        selected: &[String],
        artifact: &DownloadArtifact,
        mbps: f64,
        cancel: &CancelToken,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<(), CatalogError> {
        if cancel.is_cancelled() {
            return Err(CatalogError::DownloadCancelled(artifact.file_name.clone()));
        }
        let size_bytes = selected
            .iter()
            .filter_map(|name| record.format(name))
            .filter_map(|format| parse_size_bytes(&format.size))
            .sum::<u64>();
        let size_bytes = if size_bytes > 0 {
            size_bytes
        } else {
            record.size_bytes
        };
        let download = BandwidthDownload::new(size_bytes, mbps.clamp(1.0, 200.0))
            .with_tick_ms(self.config.download_tick_ms);
        info!(file = %artifact.file_name, size_bytes, mbps, "simulating download");
        let handle = start_download(self.scheduler.as_ref(), &artifact.file_name, download, sink);
        if handle.wait_or_cancel(cancel) {
            Ok(())
        } else {
            info!(file = %artifact.file_name, "download cancelled");
            Err(CatalogError::DownloadCancelled(artifact.file_name.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_result_formats_sizes() {
        let batch = ScanBatch {
            id: "batch-1".to_string(),
            config: BatchConfig::default(),
            start_time: chrono::Utc::now(),
            status: crate::session::BatchStatus::Scanning,
            end_time: None,
            output: None,
        };
        let result = ScanResult::from_batch(batch);
        assert_eq!(result.total_size_gb, "25.00");
        assert_eq!(result.estimated_minutes, 1);
    }
}
