use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch::{BatchWriter, InsertCounts};
use crate::catalog;
use crate::config::IngestContext;
use crate::domain::DatasetDescriptor;
use crate::download::Downloader;
use crate::error::IngestError;
use crate::fs_util::{extract_zip, pick_metadata_json};
use crate::in_memory;
use crate::progress::{ProgressSink, Reporter, Stage};
use crate::resolver::ResolveStats;
use crate::sink::{RelationalSink, StudyMetadata};
use crate::staging::StagingStore;
use crate::strategy::{ImportOutcome, ImportStrategy};
use crate::streaming::{self, ChunkSizes};

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub study_id: String,
    pub dataset_id: String,
    pub strategy: ImportStrategy,
    pub source_path: String,
    pub images: u64,
    pub counts: InsertCounts,
    pub skipped: ResolveStats,
}

pub struct Importer<D: Downloader> {
    context: IngestContext,
    downloader: D,
}

impl<D: Downloader> Importer<D> {
    pub fn new(context: IngestContext, downloader: D) -> Self {
        Self {
            context,
            downloader,
        }
    }

    /// Downloads (and unpacks) a catalog dataset, then imports it into `sink`.
    pub fn import(
        &self,
        dataset_id: &str,
        study_id: &str,
        sink: &mut dyn RelationalSink,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<ImportSummary, IngestError> {
        let descriptor = match catalog::find(dataset_id) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                Reporter::new(progress, dataset_id).error(err.to_string());
                return Err(err);
            }
        };
        let reporter = Reporter::new(progress, descriptor.name);
        let result = self
            .fetch_source(descriptor, &reporter)
            .and_then(|source| self.run(descriptor, &source, study_id, sink, &reporter));
        self.report_failure(result, &reporter)
    }

    /// Imports an already-downloaded metadata file for `descriptor`.
    pub fn import_file(
        &self,
        descriptor: &DatasetDescriptor,
        source: &Path,
        study_id: &str,
        sink: &mut dyn RelationalSink,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<ImportSummary, IngestError> {
        let reporter = Reporter::new(progress, descriptor.name);
        let result = self.run(descriptor, source, study_id, sink, &reporter);
        self.report_failure(result, &reporter)
    }

    fn report_failure(
        &self,
        result: Result<ImportSummary, IngestError>,
        reporter: &Reporter<'_>,
    ) -> Result<ImportSummary, IngestError> {
        if let Err(err) = &result {
            warn!(stage = reporter.current().name(), error = %err, "import failed");
            reporter.error(err.to_string());
        }
        result
    }

    fn fetch_source(
        &self,
        descriptor: &DatasetDescriptor,
        reporter: &Reporter<'_>,
    ) -> Result<PathBuf, IngestError> {
        reporter.stage(Stage::Downloading);
        let dir = self.context.config.downloads_dir(descriptor.id);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let destination = dir.join(descriptor.metadata_file_name());
        let downloaded = self.downloader.fetch(
            descriptor.metadata_url,
            destination.as_std_path(),
            &mut |done: u64, total: Option<u64>| reporter.download(done, total),
        )?;

        if !descriptor.is_archived {
            return Ok(downloaded);
        }
        let extract_dir = dir.join("extracted");
        if extract_dir.as_std_path().exists() {
            fs::remove_dir_all(extract_dir.as_std_path())
                .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        }
        fs::create_dir_all(extract_dir.as_std_path())
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        reporter.detail("extracting archive");
        let files = extract_zip(&downloaded, extract_dir.as_std_path())?;
        debug!(files = files.len(), "archive extracted");
        pick_metadata_json(&files).ok_or_else(|| {
            IngestError::Archive(format!("no JSON metadata in {}", downloaded.display()))
        })
    }

    fn run(
        &self,
        descriptor: &DatasetDescriptor,
        source: &Path,
        study_id: &str,
        sink: &mut dyn RelationalSink,
        reporter: &Reporter<'_>,
    ) -> Result<ImportSummary, IngestError> {
        let config = &self.context.config;
        let strategy = ImportStrategy::select(descriptor.image_count, config.streaming_threshold);
        let span = tracing::info_span!("import", dataset = descriptor.id, study = study_id, %strategy);
        let _guard = span.enter();
        info!(source = %source.display(), declared_images = descriptor.image_count, "import started");

        let mut writer = BatchWriter::new(sink);
        let outcome: ImportOutcome = match strategy {
            ImportStrategy::InMemory => {
                in_memory::run(source, descriptor.image_base_url, &mut writer, reporter)?
            }
            ImportStrategy::Streaming => {
                let mut staging = StagingStore::create(config.staging_dir.as_std_path(), study_id)?;
                let chunks = ChunkSizes {
                    images: config.image_chunk_size,
                    annotations: config.annotation_chunk_size,
                };
                let outcome = streaming::run(
                    source,
                    descriptor.image_base_url,
                    &mut staging,
                    chunks,
                    &mut writer,
                    reporter,
                )?;
                staging.close()?;
                outcome
            }
        };

        let metadata = StudyMetadata {
            study_id: study_id.to_string(),
            dataset_id: descriptor.id.to_string(),
            dataset_name: descriptor.name.to_string(),
            description: descriptor.description.to_string(),
            source_url: descriptor.metadata_url.to_string(),
            strategy: strategy.to_string(),
            imported_at: chrono::Utc::now().to_rfc3339(),
            deployments: outcome.counts.deployments,
            media: outcome.counts.media,
            observations: outcome.counts.observations,
            skipped: outcome.stats,
        };
        writer.finalize(&metadata)?;

        reporter.stage(Stage::Complete);
        info!(
            deployments = outcome.counts.deployments,
            media = outcome.counts.media,
            observations = outcome.counts.observations,
            "import complete"
        );

        Ok(ImportSummary {
            study_id: study_id.to_string(),
            dataset_id: descriptor.id.to_string(),
            strategy,
            source_path: source.display().to_string(),
            images: outcome.images,
            counts: outcome.counts,
            skipped: outcome.stats,
        })
    }
}

/// Study ids are unique per run so a re-import never touches an earlier study.
pub fn new_study_id(dataset_id: &str) -> String {
    format!(
        "{dataset_id}-{}",
        chrono::Utc::now().format("%Y%m%dT%H%M%S%3f")
    )
}
