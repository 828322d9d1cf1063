use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use rand::SeedableRng;
use rand::rngs::StdRng;

use thinslice_catalog::app::{App, DownloadOptions, NullSink};
use thinslice_catalog::catalog::FileCatalogSource;
use thinslice_catalog::clock::ManualClock;
use thinslice_catalog::config::ResolvedConfig;
use thinslice_catalog::domain::{BatchConfig, LightMode, Resolution};
use thinslice_catalog::error::CatalogError;
use thinslice_catalog::session::{ScannerStatus, SessionState};
use thinslice_catalog::store::MemoryStore;
use thinslice_catalog::timer::{CancelToken, ManualScheduler};

const RECORDS: &str = r#"[
  {"id": "TS-0001", "thin_section_id": "TS-000101", "name": "Bakken Shale", "rock_type": "Shale",
   "formation": "Bakken", "location": "North Dakota", "tags": ["shale", "unconventional"],
   "doi": "10.5066/P9ABC123",
   "file_formats": [
     {"name": "Raw TIFF Stack", "size": "2.4 GB", "format": "TIFF"},
     {"name": "Metadata", "size": "12 KB", "format": "JSON"}
   ]},
  {"id": "TS-0002", "name": "Permian Sandstone", "rock_type": "Sandstone - Arkosic",
   "formation": "Wolfcamp", "location": "Texas", "minerals": ["Quartz", "Feldspar"],
   "tags": ["reservoir"],
   "file_formats": [{"name": "DeepZoom Tiles", "size": "850 MB", "format": "DZI"}]},
  {"id": "TS-0003", "name": "Trenton Limestone", "rock_type": "Limestone",
   "formation": "Trenton", "location": "New York"}
]"#;

struct Fixture {
    _dir: tempfile::TempDir,
    out: Utf8PathBuf,
    scheduler: ManualScheduler,
    app: App,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    fs::create_dir_all(root.join("public/data")).unwrap();
    fs::write(root.join("public/data/records.json"), RECORDS).unwrap();

    let scheduler = ManualScheduler::new();
    let app = App::new(
        ResolvedConfig::default(),
        Box::new(FileCatalogSource::new(root.join("public"))),
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::default()),
        Arc::new(scheduler.clone()),
    );
    Fixture {
        out: root.join("out"),
        _dir: dir,
        scheduler,
        app,
    }
}

fn options(formats: &[&str], out: &Utf8PathBuf) -> DownloadOptions {
    DownloadOptions {
        formats: formats.iter().map(|name| name.to_string()).collect(),
        out_dir: out.clone(),
        simulate_mbps: None,
        cancel: CancelToken::new(),
    }
}

fn run_scan(fixture: &Fixture, config: BatchConfig) -> String {
    let mut handle = fixture
        .app
        .start_scan_with_rng(config, Box::new(StdRng::seed_from_u64(3)), Arc::new(NullSink))
        .unwrap();
    fixture.scheduler.advance(Duration::from_secs(27));
    handle.try_result().unwrap().unwrap().id
}

#[test]
fn search_filters_and_summarizes() {
    let fixture = fixture();
    let result = fixture.app.search("sand", None, &NullSink).unwrap();
    assert_eq!(result.total, 3);
    assert_eq!(result.matched, 1);
    assert_eq!(result.category, "all");
    assert_eq!(result.records[0].id, "TS-0002");
    assert_eq!(result.categories, vec!["Limestone", "Sandstone", "Shale"]);
    assert_eq!(
        result.tag_suggestions,
        vec!["shale", "unconventional", "reservoir"]
    );

    let by_category = fixture.app.search("", Some("limestone"), &NullSink).unwrap();
    assert_eq!(by_category.matched, 1);
    assert_eq!(by_category.records[0].name, "Trenton Limestone");
}

#[test]
fn show_returns_record_with_doi_link() {
    let fixture = fixture();
    let detail = fixture.app.show("TS-0001", &NullSink).unwrap();
    assert_eq!(detail.record.name, "Bakken Shale");
    assert_eq!(
        detail.doi_url.as_deref(),
        Some("https://doi.org/10.5066/P9ABC123")
    );
    assert_eq!(fixture.app.show("TS-0003", &NullSink).unwrap().doi_url, None);
}

#[test]
fn unknown_specimen_is_not_found() {
    let fixture = fixture();
    let err = fixture.app.show("TS-9999", &NullSink).unwrap_err();
    assert_matches!(err, CatalogError::SpecimenNotFound(id) if id == "TS-9999");
}

#[test]
fn single_format_download_writes_one_file() {
    let fixture = fixture();
    let result = fixture
        .app
        .download("TS-0001", options(&["Metadata"], &fixture.out), Arc::new(NullSink))
        .unwrap();
    assert_eq!(result.sample_id, "TS-0001");
    assert_eq!(result.files, vec![fixture.out.join("TS-000101-Metadata.zip")]);
    assert_eq!(
        fs::read_to_string(&result.files[0]).unwrap(),
        "Sample: Bakken Shale\nFormat: Metadata"
    );

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["sample_id"], "TS-0001");
    assert_eq!(json["files"][0], result.files[0].as_str());
}

#[test]
fn record_without_thin_section_id_names_files_by_catalog_id() {
    let fixture = fixture();
    let result = fixture
        .app
        .download("TS-0002", options(&["DeepZoom Tiles"], &fixture.out), Arc::new(NullSink))
        .unwrap();
    assert_eq!(
        result.files,
        vec![fixture.out.join("TS-0002-DeepZoom-Tiles.zip")]
    );
}

#[test]
fn download_without_formats_packages_everything() {
    let fixture = fixture();
    let result = fixture
        .app
        .download("TS-0001", options(&[], &fixture.out), Arc::new(NullSink))
        .unwrap();
    assert_eq!(
        result.files,
        vec![fixture.out.join("TS-000101-bulk-download.zip")]
    );
    let content = fs::read_to_string(&result.files[0]).unwrap();
    assert!(content.starts_with(
        "ThinSLICE Sample Download Package\nSample: Bakken Shale\nSample ID: TS-000101\n"
    ));
    assert!(content.contains("Downloaded: 2023-11-14T22:13:20."));
    assert!(content.ends_with("Raw TIFF Stack: 2.4 GB (TIFF)\nMetadata: 12 KB (JSON)"));
}

#[test]
fn download_rejects_unknown_format_and_record_without_files() {
    let fixture = fixture();
    let err = fixture
        .app
        .download("TS-0002", options(&["Raw TIFF Stack"], &fixture.out), Arc::new(NullSink))
        .unwrap_err();
    assert_matches!(err, CatalogError::UnknownFormat { .. });

    let err = fixture
        .app
        .download("TS-0003", options(&[], &fixture.out), Arc::new(NullSink))
        .unwrap_err();
    assert_matches!(err, CatalogError::UnknownFormat { sample, .. } if sample == "TS-0003");
    assert!(!fixture.out.as_std_path().exists());
}

#[test]
fn simulated_download_writes_after_the_transfer_completes() {
    let fixture = fixture();
    let mut options = options(&["Metadata"], &fixture.out);
    options.simulate_mbps = Some(50.0);
    let result = thread::scope(|scope| {
        let worker = scope.spawn(|| fixture.app.download("TS-0001", options, Arc::new(NullSink)));
        while !worker.is_finished() {
            fixture.scheduler.advance(Duration::from_millis(500));
            thread::sleep(Duration::from_millis(5));
        }
        worker.join().unwrap()
    })
    .unwrap();
    assert_eq!(result.files, vec![fixture.out.join("TS-000101-Metadata.zip")]);
    assert!(result.files[0].as_std_path().exists());
}

#[test]
fn cancelled_download_writes_no_file() {
    let fixture = fixture();
    let cancel = CancelToken::new();
    let mut options = options(&["Raw TIFF Stack"], &fixture.out);
    options.simulate_mbps = Some(50.0);
    options.cancel = cancel.clone();
    let err = thread::scope(|scope| {
        let worker = scope.spawn(|| fixture.app.download("TS-0001", options, Arc::new(NullSink)));
        fixture.scheduler.advance(Duration::from_secs(1));
        cancel.cancel();
        worker.join().unwrap()
    })
    .unwrap_err();
    assert_matches!(
        err,
        CatalogError::DownloadCancelled(file) if file == "TS-000101-Raw-TIFF-Stack.zip"
    );
    assert!(!fixture.out.join("TS-000101-Raw-TIFF-Stack.zip").as_std_path().exists());
    assert_eq!(fixture.scheduler.active_timers(), 0);
}

#[test]
fn download_cancelled_before_start_never_schedules() {
    let fixture = fixture();
    let mut options = options(&["Metadata"], &fixture.out);
    options.simulate_mbps = Some(50.0);
    options.cancel.cancel();
    let err = fixture
        .app
        .download("TS-0001", options, Arc::new(NullSink))
        .unwrap_err();
    assert_matches!(err, CatalogError::DownloadCancelled(_));
    assert_eq!(fixture.scheduler.active_timers(), 0);
    assert!(!fixture.out.as_std_path().exists());
}

#[test]
fn scan_history_and_export() {
    let fixture = fixture();
    assert!(fixture.app.history().unwrap().batches.is_empty());

    let config = BatchConfig::clamped(2, LightMode::Both, Resolution::Ultra);
    let batch_id = run_scan(&fixture, config);

    let history = fixture.app.history().unwrap();
    assert_eq!(history.scanner_model, "Zeiss Axioscan 7");
    assert_eq!(history.scanner_status, ScannerStatus::Ready);
    assert_eq!(history.batches.len(), 1);
    assert_eq!(history.batches[0].id, batch_id);
    assert_eq!(
        history.batches[0].output.as_ref().map(|output| output.total_frames),
        Some(4)
    );

    let path = fixture.app.export_batch(&batch_id, &fixture.out).unwrap();
    assert_eq!(path, fixture.out.join(format!("scan-{batch_id}.json")));
    let exported: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(exported["id"], batch_id.as_str());
    assert_eq!(exported["resolution"], "Ultra");

    assert_eq!(fixture.app.reset_scan().unwrap(), SessionState::Idle);
    assert_eq!(fixture.app.history().unwrap().batches.len(), 1);
}

#[test]
fn export_of_unknown_batch_fails() {
    let fixture = fixture();
    let err = fixture
        .app
        .export_batch("batch-1", &fixture.out)
        .unwrap_err();
    assert_matches!(err, CatalogError::BatchNotFound(id) if id == "batch-1");
}

#[test]
fn scan_in_progress_blocks_a_second_start() {
    let fixture = fixture();
    let _running = fixture
        .app
        .start_scan_with_rng(
            BatchConfig::default(),
            Box::new(StdRng::seed_from_u64(1)),
            Arc::new(NullSink),
        )
        .unwrap();
    assert_eq!(
        fixture.app.history().unwrap().scanner_status,
        ScannerStatus::Scanning
    );
    let err = fixture
        .app
        .start_scan_with_rng(
            BatchConfig::default(),
            Box::new(StdRng::seed_from_u64(2)),
            Arc::new(NullSink),
        )
        .err()
        .unwrap();
    assert_matches!(err, CatalogError::ScanInProgress(_));
}
