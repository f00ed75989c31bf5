use serde::Serialize;
use tracing::debug;

use crate::domain::{Deployment, EntityKind, Media, Observation, RowBatch};
use crate::error::IngestError;
use crate::sink::{RelationalSink, StudyMetadata};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertCounts {
    pub deployments: u64,
    pub media: u64,
    pub observations: u64,
}

impl InsertCounts {
    pub fn get(&self, entity: EntityKind) -> u64 {
        match entity {
            EntityKind::Deployments => self.deployments,
            EntityKind::Media => self.media,
            EntityKind::Observations => self.observations,
        }
    }

    fn add(&mut self, entity: EntityKind, rows: u64) {
        match entity {
            EntityKind::Deployments => self.deployments += rows,
            EntityKind::Media => self.media += rows,
            EntityKind::Observations => self.observations += rows,
        }
    }
}

/// Splits row slices into inserts that fit the sink's bound-parameter ceiling.
/// Deployments must all be written before the first media row.
pub struct BatchWriter<'a> {
    sink: &'a mut dyn RelationalSink,
    counts: InsertCounts,
}

impl<'a> BatchWriter<'a> {
    pub fn new(sink: &'a mut dyn RelationalSink) -> Self {
        Self {
            sink,
            counts: InsertCounts::default(),
        }
    }

    pub fn rows_per_batch(&self, entity: EntityKind) -> usize {
        (self.sink.max_parameters() / entity.column_count()).max(1)
    }

    pub fn counts(&self) -> InsertCounts {
        self.counts
    }

    pub fn finalize(&mut self, metadata: &StudyMetadata) -> Result<(), IngestError> {
        self.sink.write_metadata(metadata)
    }

    pub fn write_deployments(&mut self, rows: &[Deployment]) -> Result<u64, IngestError> {
        if self.counts.media > 0 {
            return Err(IngestError::Sink {
                entity: EntityKind::Deployments.to_string(),
                message: "deployments must be written before media".to_string(),
            });
        }
        self.write(EntityKind::Deployments, rows, RowBatch::Deployments)
    }

    pub fn write_media(&mut self, rows: &[Media]) -> Result<u64, IngestError> {
        self.write(EntityKind::Media, rows, RowBatch::Media)
    }

    pub fn write_observations(&mut self, rows: &[Observation]) -> Result<u64, IngestError> {
        self.write(EntityKind::Observations, rows, RowBatch::Observations)
    }

    fn write<'r, T>(
        &mut self,
        entity: EntityKind,
        rows: &'r [T],
        wrap: fn(&'r [T]) -> RowBatch<'r>,
    ) -> Result<u64, IngestError> {
        let size = self.rows_per_batch(entity);
        for chunk in rows.chunks(size) {
            self.sink.insert_batch(wrap(chunk))?;
            self.counts.add(entity, chunk.len() as u64);
        }
        debug!(
            %entity,
            rows = rows.len(),
            batch = size,
            total = self.counts.get(entity),
            "rows written"
        );
        Ok(rows.len() as u64)
    }
}
