use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use zip::write::SimpleFileOptions;

use camtrap_ingest::config::{IngestConfig, IngestContext};
use camtrap_ingest::domain::EntityKind;
use camtrap_ingest::download::Downloader;
use camtrap_ingest::error::IngestError;
use camtrap_ingest::pipeline::Importer;
use camtrap_ingest::progress::{ProgressEvent, ProgressPayload, Stage};
use camtrap_ingest::sink::memory::MemorySink;
use camtrap_ingest::sink::sqlite::SqliteSink;
use camtrap_ingest::strategy::ImportStrategy;

const METADATA: &str = r#"{
  "images": [
    {"id": "x1", "file_name": "cam/x1.JPG", "location": 4, "datetime": "2020-01-01T00:00:00", "width": 100, "height": 100},
    {"id": "x2", "file_name": "cam/x2.JPG", "location": 4, "datetime": "2020-01-03T00:00:00", "width": 100, "height": 100}
  ],
  "annotations": [{"id": "o1", "image_id": "x2", "category_id": 3, "bbox": [10, 10, 20, 20]}],
  "categories": [{"id": 3, "name": "person"}]
}"#;

enum Payload {
    Json,
    Zip,
    Fail,
}

struct FixtureDownloader {
    payload: Payload,
    requests: RefCell<Vec<String>>,
}

impl FixtureDownloader {
    fn new(payload: Payload) -> Self {
        Self {
            payload,
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl Downloader for FixtureDownloader {
    fn fetch(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<PathBuf, IngestError> {
        self.requests.borrow_mut().push(url.to_string());
        match self.payload {
            Payload::Json => fs::write(destination, METADATA).unwrap(),
            Payload::Zip => {
                let file = fs::File::create(destination).unwrap();
                let mut zip = zip::ZipWriter::new(file);
                let options = SimpleFileOptions::default();
                zip.start_file("__MACOSX/._labels.json", options).unwrap();
                zip.write_all(b"\x00\x05").unwrap();
                zip.start_file("labels.json", options).unwrap();
                zip.write_all(METADATA.as_bytes()).unwrap();
                zip.finish().unwrap();
            }
            Payload::Fail => {
                return Err(IngestError::DownloadStatus {
                    status: 404,
                    message: "not found".to_string(),
                });
            }
        }
        let size = fs::metadata(destination).unwrap().len();
        on_progress(size / 2, Some(size));
        on_progress(size, Some(size));
        Ok(destination.to_path_buf())
    }
}

fn context(root: &Path) -> IngestContext {
    let mut config = IngestConfig::with_data_root(Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap());
    config.staging_dir = config.data_root_path.clone();
    IngestContext::new(config)
}

#[test]
fn plain_json_download_is_imported() {
    let dir = tempfile::tempdir().unwrap();
    let importer = Importer::new(context(dir.path()), FixtureDownloader::new(Payload::Json));
    let events = RefCell::new(Vec::<ProgressEvent>::new());
    let progress = |event: ProgressEvent| events.borrow_mut().push(event);
    let mut sink = MemorySink::new();

    let summary = importer
        .import("ENA24", "ena-study", &mut sink, Some(&progress))
        .unwrap();

    assert_eq!(summary.dataset_id, "ena24");
    assert_eq!(summary.strategy, ImportStrategy::InMemory);
    assert!(summary.source_path.ends_with("ena24.json"));
    assert!(dir.path().join("downloads/ena24/ena24.json").exists());

    assert_eq!(sink.deployments.len(), 1);
    assert_eq!(sink.deployments[0].deployment_id, "4");
    assert_eq!(sink.deployments[0].start.as_deref(), Some("2020-01-01T00:00:00.000Z"));
    assert_eq!(sink.deployments[0].end.as_deref(), Some("2020-01-03T00:00:00.000Z"));
    assert_eq!(sink.observations[0].observation_type, "human");

    let events = events.borrow();
    assert_eq!(events[0].stage, Stage::Downloading);
    assert!(events.iter().any(|event| matches!(
        event.payload,
        Some(ProgressPayload::Download { total: Some(_), .. })
    )));
    assert_eq!(events.last().unwrap().stage, Stage::Complete);
}

#[test]
fn archived_download_is_extracted_and_streamed() {
    let dir = tempfile::tempdir().unwrap();
    let downloader = FixtureDownloader::new(Payload::Zip);
    let importer = Importer::new(context(dir.path()), downloader);
    let mut sink = SqliteSink::open_in_memory().unwrap();

    let summary = importer
        .import("orinoquia-camera-traps", "ori-study", &mut sink, None)
        .unwrap();

    assert_eq!(summary.strategy, ImportStrategy::Streaming);
    assert!(summary.source_path.ends_with("labels.json"));
    assert_eq!(sink.count(EntityKind::Media).unwrap(), 2);
    assert_eq!(sink.count(EntityKind::Observations).unwrap(), 1);
    let metadata = sink.metadata().unwrap().unwrap();
    assert_eq!(metadata.dataset_id, "orinoquia-camera-traps");
    assert_eq!(metadata.strategy, "streaming");
}

#[test]
fn download_failure_reports_downloading_stage() {
    let dir = tempfile::tempdir().unwrap();
    let importer = Importer::new(context(dir.path()), FixtureDownloader::new(Payload::Fail));
    let events = RefCell::new(Vec::<ProgressEvent>::new());
    let progress = |event: ProgressEvent| events.borrow_mut().push(event);
    let mut sink = MemorySink::new();

    let err = importer
        .import("ena24", "ena-study", &mut sink, Some(&progress))
        .unwrap_err();

    assert_matches!(err, IngestError::DownloadStatus { status: 404, .. });
    assert!(sink.batches.is_empty());
    let events = events.borrow();
    let last = events.last().unwrap();
    assert_eq!(last.stage, Stage::Error);
    assert_eq!(last.stage_index, 0);
}
