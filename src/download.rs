use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{FileFormat, SpecimenRecord};
use crate::error::CatalogError;
use crate::progress::{DOWNLOAD_TICK_MS, ProgressUpdate};
use crate::session::ScanBatch;
use crate::store::write_atomic;
use crate::timer::{CancelToken, Scheduler, Tick, TimerHandle};

pub const DEFAULT_BANDWIDTH_MBPS: f64 = 50.0;
const BYTES_PER_MEGABIT: f64 = 125_000.0;
const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthDownload {
    size_bytes: u64,
    mbps: f64,
    tick_ms: u64,
    percent: f64,
    completed: bool,
}

impl BandwidthDownload {
    pub fn new(size_bytes: u64, mbps: f64) -> Self {
        Self {
            size_bytes,
            mbps,
            tick_ms: DOWNLOAD_TICK_MS,
            percent: 0.0,
            completed: false,
        }
    }

    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.tick_ms = tick_ms.max(1);
        self
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    pub fn increment_per_tick(&self) -> f64 {
        if self.size_bytes == 0 {
            return 100.0;
        }
        let bytes = self.mbps.max(0.0) * BYTES_PER_MEGABIT * (self.tick_ms as f64 / 1000.0);
        bytes / self.size_bytes as f64 * 100.0
    }

    pub fn tick(&mut self) -> ProgressUpdate {
        self.percent = (self.percent + self.increment_per_tick()).min(100.0);
        let completed_now = !self.completed && self.percent >= 100.0;
        if completed_now {
            self.completed = true;
        }
        ProgressUpdate {
            percent: self.percent,
            completed_now,
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }
}

pub struct DownloadHandle {
    timer: TimerHandle,
    done: Receiver<()>,
}

impl DownloadHandle {
    pub fn is_finished(&self) -> bool {
        !self.timer.is_active()
    }

    pub fn wait(self) -> bool {
        self.done.recv().is_ok()
    }

    pub fn wait_or_cancel(mut self, cancel: &CancelToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                self.timer.cancel();
                return false;
            }
            match self.done.recv_timeout(CANCEL_POLL) {
                Ok(()) => return true,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    pub fn cancel(mut self) {
        self.timer.cancel();
    }
}

pub fn start_download(
    scheduler: &dyn Scheduler,
    label: &str,
    mut download: BandwidthDownload,
    sink: Arc<dyn ProgressSink>,
) -> DownloadHandle {
    let (tx, rx) = mpsc::channel();
    let label = label.to_string();
    let period = Duration::from_millis(download.tick_ms());
    let timer = scheduler.every(
        period,
        Box::new(move || {
            let update = download.tick();
            sink.event(ProgressEvent::Download {
                label: label.clone(),
                percent: update.percent,
            });
            if update.completed_now {
                sink.event(ProgressEvent::DownloadCompleted {
                    label: label.clone(),
                });
                tx.send(()).ok();
                return Tick::Stop;
            }
            Tick::Continue
        }),
    );
    DownloadHandle { timer, done: rx }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadArtifact {
    pub file_name: String,
    pub content: String,
}

impl DownloadArtifact {
    pub fn write_to(&self, dir: &Utf8Path) -> Result<Utf8PathBuf, CatalogError> {
        let path = dir.join(&self.file_name);
        write_atomic(&path, self.content.as_bytes())?;
        info!(path = %path, bytes = self.content.len(), "download artifact written");
        Ok(path)
    }
}

pub fn single_format_artifact(
    record: &SpecimenRecord,
    format_name: &str,
) -> Result<DownloadArtifact, CatalogError> {
    let format = lookup_format(record, format_name)?;
    let slug = format.name.split_whitespace().collect::<Vec<_>>().join("-");
    Ok(DownloadArtifact {
        file_name: format!("{}-{slug}.zip", record.sample_id()),
        content: format!("Sample: {}\nFormat: {}", record.name, format.name),
    })
}

pub fn bulk_artifact(
    record: &SpecimenRecord,
    selected: &[String],
    now: DateTime<Utc>,
) -> Result<DownloadArtifact, CatalogError> {
    for name in selected {
        lookup_format(record, name)?;
    }
    let lines: Vec<String> = record
        .file_formats
        .iter()
        .filter(|format| {
            selected
                .iter()
                .any(|name| format.name.eq_ignore_ascii_case(name.trim()))
        })
        .map(|format| format!("{}: {} ({})", format.name, format.size, format.format))
        .collect();
    let content = format!(
        "ThinSLICE Sample Download Package\nSample: {}\nSample ID: {}\nDownloaded: {}\n\nIncluded Files:\n{}",
        record.name,
        record.sample_id(),
        now.to_rfc3339_opts(SecondsFormat::Millis, true),
        lines.join("\n")
    );
    Ok(DownloadArtifact {
        file_name: format!("{}-bulk-download.zip", record.sample_id()),
        content,
    })
}

pub fn batch_artifact(batch: &ScanBatch) -> Result<DownloadArtifact, CatalogError> {
    let content = serde_json::to_string_pretty(batch)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    Ok(DownloadArtifact {
        file_name: format!("scan-{}.json", batch.id),
        content,
    })
}

fn lookup_format<'a>(
    record: &'a SpecimenRecord,
    name: &str,
) -> Result<&'a FileFormat, CatalogError> {
    record
        .format(name)
        .ok_or_else(|| CatalogError::UnknownFormat {
            sample: record.id.clone(),
            format: name.to_string(),
        })
}

pub fn parse_size_bytes(size: &str) -> Option<u64> {
    let size = size.trim();
    let split = size
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(size.len());
    let value: f64 = size[..split].trim().parse().ok()?;
    let factor = match size[split..].trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_matches_link_speed() {
        let download = BandwidthDownload::new(6_250_000, 50.0);
        assert_eq!(download.increment_per_tick(), 50.0);
    }

    #[test]
    fn completes_once_and_saturates() {
        let mut download = BandwidthDownload::new(10_000_000, 50.0);
        let updates: Vec<ProgressUpdate> = (0..6).map(|_| download.tick()).collect();
        let completions = updates.iter().filter(|update| update.completed_now).count();
        assert_eq!(completions, 1);
        assert!(updates[3].completed_now);
        assert_eq!(download.percent(), 100.0);
    }

    #[test]
    fn sizes_parse() {
        assert_eq!(parse_size_bytes("2.5 GB"), Some(2_500_000_000));
        assert_eq!(parse_size_bytes("850MB"), Some(850_000_000));
        assert_eq!(parse_size_bytes("12"), Some(12));
        assert_eq!(parse_size_bytes("huge"), None);
    }
}
