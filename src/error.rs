use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("invalid light mode: {0}")]
    InvalidLightMode(String),

    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("failed to parse catalog fixture {url}: {message}")]
    CatalogParse { url: String, message: String },

    #[error("specimen not found: {0}")]
    SpecimenNotFound(String),

    #[error("scan batch not found in history: {0}")]
    BatchNotFound(String),

    #[error("download format not available for {sample}: {format}")]
    UnknownFormat { sample: String, format: String },

    #[error("a scan batch is already in progress: {0}")]
    #[diagnostic(help("wait for the running batch to finish or cancel it first"))]
    ScanInProgress(String),

    #[error("scanner is offline: {0}")]
    ScannerOffline(String),

    #[error("no scan batch is in progress")]
    NoActiveScan,

    #[error("scan session lock poisoned")]
    SessionPoisoned,

    #[error("scan cancelled")]
    ScanCancelled,

    #[error("download cancelled: {0}")]
    DownloadCancelled(String),

    #[error("missing config file: {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
