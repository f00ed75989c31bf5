use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("download request failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("source is missing required array `{0}`")]
    MissingArray(String),

    #[error("source key `{0}` is present but is not an array")]
    NotAnArray(String),

    #[error("malformed JSON in source: {0}")]
    MalformedJson(String),

    #[error("staging store error: {0}")]
    Staging(String),

    #[error("sink rejected {entity} batch: {message}")]
    Sink { entity: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
