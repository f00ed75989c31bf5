use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

pub const DEFAULT_CONFIG_FILE: &str = "camtrap-ingest.json";
pub const DEFAULT_STREAMING_THRESHOLD: u64 = 100_000;
pub const DEFAULT_IMAGE_CHUNK_SIZE: usize = 5_000;
pub const DEFAULT_ANNOTATION_CHUNK_SIZE: usize = 5_000;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub data_root_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub streaming_threshold: Option<u64>,
    #[serde(default)]
    pub image_chunk_size: Option<usize>,
    #[serde(default)]
    pub annotation_chunk_size: Option<usize>,
    #[serde(default)]
    pub staging_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestConfig {
    pub data_root_path: Utf8PathBuf,
    pub streaming_threshold: u64,
    pub image_chunk_size: usize,
    pub annotation_chunk_size: usize,
    pub staging_dir: Utf8PathBuf,
}

impl IngestConfig {
    pub fn with_data_root(data_root_path: Utf8PathBuf) -> Self {
        Self {
            data_root_path,
            streaming_threshold: DEFAULT_STREAMING_THRESHOLD,
            image_chunk_size: DEFAULT_IMAGE_CHUNK_SIZE,
            annotation_chunk_size: DEFAULT_ANNOTATION_CHUNK_SIZE,
            staging_dir: default_staging_dir(),
        }
    }

    pub fn downloads_dir(&self, dataset_id: &str) -> Utf8PathBuf {
        self.data_root_path.join("downloads").join(dataset_id)
    }

    pub fn study_dir(&self, study_id: &str) -> Utf8PathBuf {
        self.data_root_path.join("studies").join(study_id)
    }
}

/// Explicit environment handed to the importer in place of process-wide state.
#[derive(Debug, Clone)]
pub struct IngestContext {
    pub config: IngestConfig,
}

impl IngestContext {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<IngestConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<IngestConfig, IngestError> {
        let data_root_path = match config.data_root_path {
            Some(path) => path,
            None => default_data_root()?,
        };
        let image_chunk_size = config.image_chunk_size.unwrap_or(DEFAULT_IMAGE_CHUNK_SIZE);
        let annotation_chunk_size = config
            .annotation_chunk_size
            .unwrap_or(DEFAULT_ANNOTATION_CHUNK_SIZE);
        if image_chunk_size == 0 || annotation_chunk_size == 0 {
            return Err(IngestError::ConfigParse(
                "chunk sizes must be greater than zero".to_string(),
            ));
        }

        Ok(IngestConfig {
            data_root_path,
            streaming_threshold: config
                .streaming_threshold
                .unwrap_or(DEFAULT_STREAMING_THRESHOLD),
            image_chunk_size,
            annotation_chunk_size,
            staging_dir: config.staging_dir.unwrap_or_else(default_staging_dir),
        })
    }
}

pub fn default_data_root() -> Result<Utf8PathBuf, IngestError> {
    if let Some(dirs) = ProjectDirs::from("org", "camtrap", "camtrap-ingest") {
        if let Ok(path) = Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf()) {
            return Ok(path);
        }
    }
    let cwd = std::env::current_dir().map_err(|err| IngestError::Filesystem(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd.join(".camtrap-ingest"))
        .map_err(|_| IngestError::Filesystem("invalid data root path".to_string()))
}

fn default_staging_dir() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("."))
}
