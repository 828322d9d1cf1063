use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, MonotonicStamp};
use crate::domain::BatchConfig;
use crate::error::CatalogError;
use crate::generator::{SCANNER_MODEL, ScanOutput};
use crate::store::{self, KeyValueStore, SCAN_HISTORY_KEY};

pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Scanning,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanBatch {
    pub id: String,
    #[serde(flatten)]
    pub config: BatchConfig,
    pub start_time: DateTime<Utc>,
    pub status: BatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ScanOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Scanning,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerStatus {
    Ready,
    Scanning,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub progress: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct ScanSession {
    clock: Arc<dyn Clock>,
    storage: Option<Arc<dyn KeyValueStore>>,
    stamps: MonotonicStamp,
    scanner_model: String,
    scanner_connected: bool,
    state: SessionState,
    current: Option<ScanBatch>,
    progress: f64,
    current_step: Option<String>,
    step_log: Vec<StepRecord>,
    history: VecDeque<ScanBatch>,
    history_limit: usize,
}

impl ScanSession {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            storage: None,
            stamps: MonotonicStamp::default(),
            scanner_model: SCANNER_MODEL.to_string(),
            scanner_connected: true,
            state: SessionState::Idle,
            current: None,
            progress: 0.0,
            current_step: None,
            step_log: Vec::new(),
            history: VecDeque::new(),
            history_limit: HISTORY_LIMIT,
        }
    }

    pub fn with_storage(
        clock: Arc<dyn Clock>,
        storage: Arc<dyn KeyValueStore>,
        history_limit: usize,
    ) -> Self {
        let mut session = Self::new(clock);
        session.history_limit = history_limit.max(1);
        session.history = match store::read_list::<ScanBatch>(storage.as_ref(), SCAN_HISTORY_KEY) {
            Ok(stored) => stored
                .into_iter()
                .rev()
                .take(session.history_limit)
                .collect(),
            Err(err) => {
                warn!(error = %err, "failed to load scan history");
                VecDeque::new()
            }
        };
        session.storage = Some(storage);
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn scanner_model(&self) -> &str {
        &self.scanner_model
    }

    pub fn scanner_status(&self) -> ScannerStatus {
        if !self.scanner_connected {
            ScannerStatus::Offline
        } else if self.state == SessionState::Scanning {
            ScannerStatus::Scanning
        } else {
            ScannerStatus::Ready
        }
    }

    pub fn set_scanner_connected(&mut self, connected: bool) {
        self.scanner_connected = connected;
    }

    pub fn current_batch(&self) -> Option<&ScanBatch> {
        self.current.as_ref()
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    pub fn step_log(&self) -> &[StepRecord] {
        &self.step_log
    }

    pub fn history(&self) -> impl Iterator<Item = &ScanBatch> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn start_batch(&mut self, config: BatchConfig) -> Result<&ScanBatch, CatalogError> {
        if self.state == SessionState::Scanning {
            let active = self
                .current
                .as_ref()
                .map(|batch| batch.id.clone())
                .unwrap_or_default();
            return Err(CatalogError::ScanInProgress(active));
        }
        if !self.scanner_connected {
            return Err(CatalogError::ScannerOffline(self.scanner_model.clone()));
        }

        let stamp = self.stamps.next(self.clock.as_ref());
        let batch = ScanBatch {
            id: format!("batch-{stamp}"),
            config,
            start_time: self.clock.now(),
            status: BatchStatus::Scanning,
            end_time: None,
            output: None,
        };
        info!(
            batch = %batch.id,
            sections = config.num_sections,
            light_mode = %config.light_mode,
            resolution = %config.resolution,
            "scan started"
        );
        self.clear_transient();
        self.state = SessionState::Scanning;
        Ok(self.current.insert(batch))
    }

    pub fn update_progress(&mut self, percent: f64, step: &str) -> bool {
        if self.state != SessionState::Scanning {
            debug!(step, "progress ignored outside a scan");
            return false;
        }
        let percent = if percent.is_nan() {
            self.progress
        } else {
            percent.clamp(0.0, 100.0)
        };
        self.progress = self.progress.max(percent);
        self.current_step = Some(step.to_string());
        self.step_log.push(StepRecord {
            step: step.to_string(),
            progress: self.progress,
            timestamp: self.clock.now(),
        });
        true
    }

    pub fn complete_scan(&mut self, output: ScanOutput) -> Result<ScanBatch, CatalogError> {
        if self.state != SessionState::Scanning {
            return Err(CatalogError::NoActiveScan);
        }
        let mut batch = self.current.take().ok_or(CatalogError::NoActiveScan)?;
        batch.status = BatchStatus::Completed;
        batch.end_time = Some(self.clock.now());
        batch.output = Some(ScanOutput {
            batch_id: batch.id.clone(),
            ..output
        });

        self.history.push_front(batch.clone());
        self.history.truncate(self.history_limit);
        self.progress = 100.0;
        self.state = SessionState::Completed;
        self.current = Some(batch.clone());
        info!(batch = %batch.id, history = self.history.len(), "scan completed");

        self.persist(&batch);
        Ok(batch)
    }

    pub fn reset_scan(&mut self) {
        self.clear_transient();
        self.current = None;
        self.state = SessionState::Idle;
    }

    /// Abandons the batch with this id if it is the one still scanning.
    /// Any other state is left alone.
    pub fn cancel_batch(&mut self, id: &str) -> bool {
        let owns_scan = self.state == SessionState::Scanning
            && self.current.as_ref().is_some_and(|batch| batch.id == id);
        if !owns_scan {
            debug!(batch = id, "cancel ignored for inactive batch");
            return false;
        }
        info!(batch = id, progress = self.progress, "scan cancelled");
        self.reset_scan();
        true
    }

    fn clear_transient(&mut self) {
        self.progress = 0.0;
        self.current_step = None;
        self.step_log.clear();
    }

    fn persist(&self, batch: &ScanBatch) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(err) =
            store::append_list(storage.as_ref(), SCAN_HISTORY_KEY, batch, self.history_limit)
        {
            warn!(batch = %batch.id, error = %err, "failed to persist scan history");
        }
    }
}
