use std::io::{self, Write};

use serde::Serialize;
use tracing::debug;

use crate::app::{
    DownloadResult, HistoryResult, ProgressEvent, ProgressSink, ScanResult, SearchResult,
    SpecimenDetail,
};
use crate::export::ExportReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_search(result: &SearchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_show(result: &SpecimenDetail) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_scan(result: &ScanResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_history(result: &HistoryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_export(result: &ExportReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Message(message) => debug!(%message, "progress"),
            ProgressEvent::Started { batch_id, .. } => debug!(%batch_id, "scan started"),
            ProgressEvent::Step { step, percent, .. } => {
                debug!(step = step.id, percent, "scan step")
            }
            ProgressEvent::Completed { batch } => debug!(batch = %batch.id, "scan completed"),
            ProgressEvent::Download { label, percent } => debug!(%label, percent, "download"),
            ProgressEvent::DownloadCompleted { label } => debug!(%label, "download completed"),
        }
    }
}
