use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use rand::SeedableRng;
use rand::rngs::StdRng;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::domain::SpecimenRecord;
use crate::error::CatalogError;
use crate::generator::RandomSource;

pub const DEFAULT_CATALOG_URL: &str = "/data/records.json";

pub trait CatalogSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, CatalogError>;
}

#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    root: Utf8PathBuf,
}

impl FileCatalogSource {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, url: &str) -> Utf8PathBuf {
        let relative = url.split(['?', '#']).next().unwrap_or(url);
        self.root.join(relative.trim_start_matches('/'))
    }
}

impl CatalogSource for FileCatalogSource {
    fn fetch(&self, url: &str) -> Result<String, CatalogError> {
        let path = self.path_for(url);
        if !path.as_std_path().is_file() {
            return Err(CatalogError::CatalogStatus {
                status: 404,
                message: format!("{url} not found under {}", self.root),
            });
        }
        fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::CatalogHttp(format!("read {path}: {err}")))
    }
}

#[derive(Clone)]
pub struct HttpCatalogSource {
    client: Client,
    base_url: String,
}

impl HttpCatalogSource {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("thinslice/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| CatalogError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, CatalogError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "catalog request failed".to_string());
        Err(CatalogError::CatalogStatus { status, message })
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch(&self, url: &str) -> Result<String, CatalogError> {
        let response = self
            .client
            .get(self.resolve(url))
            .send()
            .map_err(|err| CatalogError::CatalogHttp(err.to_string()))?;
        Self::handle_status(response)?
            .text()
            .map_err(|err| CatalogError::CatalogHttp(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyOptions {
    pub latency_ms: u64,
    pub jitter_ms: u64,
    pub cached_cap_ms: u64,
    pub ttl_ms: u64,
}

impl Default for LatencyOptions {
    fn default() -> Self {
        Self {
            latency_ms: 400,
            jitter_ms: 300,
            cached_cap_ms: 80,
            ttl_ms: 60_000,
        }
    }
}

impl LatencyOptions {
    pub fn cached_delay_ms(&self) -> u64 {
        self.cached_cap_ms.min(self.latency_ms)
    }
}

struct CacheEntry {
    fetched_at: u64,
    records: Arc<Vec<SpecimenRecord>>,
}

pub struct CatalogProvider {
    source: Box<dyn CatalogSource>,
    clock: Arc<dyn Clock>,
    options: LatencyOptions,
    rng: Mutex<StdRng>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl CatalogProvider {
    pub fn new(source: Box<dyn CatalogSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            options: LatencyOptions::default(),
            rng: Mutex::new(StdRng::from_os_rng()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_options(mut self, options: LatencyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn options(&self) -> LatencyOptions {
        self.options
    }

    pub fn load(&self, url: &str) -> Result<Arc<Vec<SpecimenRecord>>, CatalogError> {
        if let Some(records) = self.cached(url) {
            debug!(url, count = records.len(), "catalog cache hit");
            self.clock
                .sleep(Duration::from_millis(self.options.cached_delay_ms()));
            return Ok(records);
        }

        self.clock.sleep(Duration::from_millis(self.cold_delay_ms()));
        let body = self.source.fetch(url)?;
        let records: Vec<SpecimenRecord> =
            serde_json::from_str(&body).map_err(|err| CatalogError::CatalogParse {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        let records = Arc::new(records);
        info!(url, count = records.len(), "catalog loaded");
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                url.to_string(),
                CacheEntry {
                    fetched_at: self.clock.now_millis(),
                    records: records.clone(),
                },
            );
        }
        Ok(records)
    }

    pub fn find(&self, url: &str, id: &str) -> Result<SpecimenRecord, CatalogError> {
        self.load(url)?
            .iter()
            .find(|record| record.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::SpecimenNotFound(id.to_string()))
    }

    pub fn invalidate(&self, url: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(url);
        }
    }

    fn cached(&self, url: &str) -> Option<Arc<Vec<SpecimenRecord>>> {
        let cache = self.cache.lock().ok()?;
        let entry = cache.get(url)?;
        let age = self.clock.now_millis().saturating_sub(entry.fetched_at);
        (age < self.options.ttl_ms).then(|| entry.records.clone())
    }

    fn cold_delay_ms(&self) -> u64 {
        let jitter = match self.rng.lock() {
            Ok(mut rng) => rng.next_f64() * self.options.jitter_ms as f64,
            Err(_) => 0.0,
        };
        self.options.latency_ms + jitter as u64
    }
}
