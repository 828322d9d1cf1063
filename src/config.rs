use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::catalog::{DEFAULT_CATALOG_URL, LatencyOptions};
use crate::download::DEFAULT_BANDWIDTH_MBPS;
use crate::error::CatalogError;
use crate::progress::{DOWNLOAD_TICK_MS, SCAN_TICK_MS};
use crate::session::HISTORY_LIMIT;

pub const DEFAULT_CONFIG_FILE: &str = "thinslice.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub download: DownloadSection,
    #[serde(default)]
    pub storage_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CatalogSection {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub data_root: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub jitter_ms: Option<u64>,
    #[serde(default)]
    pub cached_latency_ms: Option<u64>,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ScanSection {
    #[serde(default)]
    pub tick_ms: Option<u64>,
    #[serde(default)]
    pub history_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DownloadSection {
    #[serde(default)]
    pub tick_ms: Option<u64>,
    #[serde(default)]
    pub bandwidth_mbps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLocation {
    Directory(Utf8PathBuf),
    Http(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub catalog_url: String,
    pub catalog_location: CatalogLocation,
    pub latency: LatencyOptions,
    pub scan_tick_ms: u64,
    pub history_limit: usize,
    pub download_tick_ms: u64,
    pub bandwidth_mbps: f64,
    pub storage_dir: Option<Utf8PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `thinslice.json` in the working directory. Only an
    /// explicitly named file has to exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.exists() {
            return match path {
                Some(_) => Err(CatalogError::MissingConfig(config_path)),
                None => Ok(ResolvedConfig::default()),
            };
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = LatencyOptions::default();
        let catalog = config.catalog;
        let catalog_location = match catalog.base_url {
            Some(base_url) => CatalogLocation::Http(base_url),
            None => CatalogLocation::Directory(Utf8PathBuf::from(
                catalog.data_root.unwrap_or_else(|| "public".to_string()),
            )),
        };

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            catalog_url: catalog
                .url
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            catalog_location,
            latency: LatencyOptions {
                latency_ms: catalog.latency_ms.unwrap_or(defaults.latency_ms),
                jitter_ms: catalog.jitter_ms.unwrap_or(defaults.jitter_ms),
                cached_cap_ms: catalog.cached_latency_ms.unwrap_or(defaults.cached_cap_ms),
                ttl_ms: catalog.ttl_ms.unwrap_or(defaults.ttl_ms),
            },
            scan_tick_ms: config.scan.tick_ms.unwrap_or(SCAN_TICK_MS).max(1),
            history_limit: config.scan.history_limit.unwrap_or(HISTORY_LIMIT).max(1),
            download_tick_ms: config.download.tick_ms.unwrap_or(DOWNLOAD_TICK_MS).max(1),
            bandwidth_mbps: config
                .download
                .bandwidth_mbps
                .unwrap_or(DEFAULT_BANDWIDTH_MBPS),
            storage_dir: config.storage_dir.map(Utf8PathBuf::from),
        }
    }
}
