use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rand::SeedableRng;
use rand::rngs::StdRng;

use thinslice_catalog::clock::{Clock, ManualClock};
use thinslice_catalog::domain::BatchConfig;
use thinslice_catalog::error::CatalogError;
use thinslice_catalog::generator::ScanGenerator;
use thinslice_catalog::session::{BatchStatus, ScanBatch, ScanSession, SessionState};
use thinslice_catalog::store::{self, FileStore, KeyValueStore, MemoryStore, SCAN_HISTORY_KEY};

struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>, CatalogError> {
        Ok(None)
    }

    fn set(&self, key: &str, _value: &str) -> Result<(), CatalogError> {
        Err(CatalogError::Storage(format!("quota exceeded writing {key}")))
    }

    fn remove(&self, _key: &str) -> Result<(), CatalogError> {
        Ok(())
    }
}

fn run_batch(session: &mut ScanSession, clock: &Arc<ManualClock>) -> ScanBatch {
    let config = BatchConfig::default();
    session.start_batch(config).unwrap();
    clock.advance(Duration::from_secs(27));
    let mut rng = StdRng::seed_from_u64(7);
    let output = ScanGenerator::new(clock.clone()).generate(&config, &mut rng);
    session.complete_scan(output).unwrap()
}

#[test]
fn file_store_round_trips_values() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("cache")).unwrap();
    let store = FileStore::with_root(root.clone());

    assert_eq!(store.get("thinslice_scans").unwrap(), None);
    store.set("thinslice_scans", "[1,2]").unwrap();
    assert_eq!(store.get("thinslice_scans").unwrap().as_deref(), Some("[1,2]"));
    assert!(root.join("thinslice_scans.json").as_std_path().exists());

    store.remove("thinslice_scans").unwrap();
    assert_eq!(store.get("thinslice_scans").unwrap(), None);
    store.remove("thinslice_scans").unwrap();
}

#[test]
fn history_survives_a_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::with_root(root));
    let clock = Arc::new(ManualClock::default());

    let mut ids = Vec::new();
    {
        let mut session = ScanSession::with_storage(clock.clone(), storage.clone(), 10);
        for _ in 0..12 {
            ids.push(run_batch(&mut session, &clock).id);
            session.reset_scan();
        }
    }

    let reloaded = ScanSession::with_storage(clock, storage.clone(), 10);
    assert_eq!(reloaded.state(), SessionState::Idle);
    let history: Vec<&str> = reloaded.history().map(|batch| batch.id.as_str()).collect();
    let expected: Vec<&str> = ids.iter().rev().take(10).map(String::as_str).collect();
    assert_eq!(history, expected);
    assert!(
        reloaded
            .history()
            .all(|batch| batch.status == BatchStatus::Completed && batch.output.is_some())
    );

    let stored: Vec<ScanBatch> = store::read_list(storage.as_ref(), SCAN_HISTORY_KEY).unwrap();
    assert_eq!(stored.len(), 10);
    assert_eq!(stored.last().map(|batch| batch.id.as_str()), Some(ids[11].as_str()));
}

#[test]
fn failing_storage_does_not_fail_completion() {
    let clock = Arc::new(ManualClock::default());
    let mut session = ScanSession::with_storage(clock.clone(), Arc::new(FailingStore), 10);
    let batch = run_batch(&mut session, &clock);
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(session.history_len(), 1);
}

#[test]
fn corrupt_history_loads_as_empty() {
    let storage = Arc::new(MemoryStore::new());
    storage.set(SCAN_HISTORY_KEY, "{\"truncated").unwrap();
    let clock = Arc::new(ManualClock::default());
    let mut session = ScanSession::with_storage(clock.clone(), storage.clone(), 10);
    assert_eq!(session.history_len(), 0);

    run_batch(&mut session, &clock);
    assert_eq!(session.history_len(), 1);
}

#[test]
fn batch_ids_are_unique_within_one_millisecond() {
    let clock = Arc::new(ManualClock::default());
    let mut session = ScanSession::new(clock.clone());
    let first = session.start_batch(BatchConfig::default()).unwrap().id.clone();
    session.reset_scan();
    let second = session.start_batch(BatchConfig::default()).unwrap().id.clone();
    assert_ne!(first, second);
    assert_eq!(
        session.current_batch().map(|batch| batch.start_time),
        Some(clock.now())
    );
}
