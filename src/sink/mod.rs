//! Relational sink contract. Schema ownership stays with the implementation;
//! the pipeline only ever inserts rows and a final metadata record.

pub mod memory;
pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::domain::RowBatch;
use crate::error::IngestError;
use crate::resolver::ResolveStats;

/// SQLite's historical `SQLITE_MAX_VARIABLE_NUMBER`.
pub const DEFAULT_MAX_PARAMETERS: usize = 999;

pub trait RelationalSink {
    /// Ceiling on bound parameters in one insert statement.
    fn max_parameters(&self) -> usize {
        DEFAULT_MAX_PARAMETERS
    }

    fn insert_batch(&mut self, batch: RowBatch<'_>) -> Result<(), IngestError>;

    fn write_metadata(&mut self, metadata: &StudyMetadata) -> Result<(), IngestError>;
}

impl<S: RelationalSink + ?Sized> RelationalSink for &mut S {
    fn max_parameters(&self) -> usize {
        (**self).max_parameters()
    }

    fn insert_batch(&mut self, batch: RowBatch<'_>) -> Result<(), IngestError> {
        (**self).insert_batch(batch)
    }

    fn write_metadata(&mut self, metadata: &StudyMetadata) -> Result<(), IngestError> {
        (**self).write_metadata(metadata)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMetadata {
    pub study_id: String,
    pub dataset_id: String,
    pub dataset_name: String,
    pub description: String,
    pub source_url: String,
    pub strategy: String,
    pub imported_at: String,
    pub deployments: u64,
    pub media: u64,
    pub observations: u64,
    pub skipped: ResolveStats,
}
