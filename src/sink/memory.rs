use std::collections::HashSet;

use crate::domain::{Deployment, EntityKind, Media, Observation, RowBatch};
use crate::error::IngestError;
use crate::sink::{DEFAULT_MAX_PARAMETERS, RelationalSink, StudyMetadata};

/// Keeps every row in memory. Enforces the media → deployment reference the
/// same way the SQLite schema does.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub deployments: Vec<Deployment>,
    pub media: Vec<Media>,
    pub observations: Vec<Observation>,
    pub metadata: Option<StudyMetadata>,
    /// Entity and size of every insert call, in call order.
    pub batches: Vec<(EntityKind, usize)>,
    pub max_parameters: Option<usize>,
    pub fail_on: Option<EntityKind>,
    deployment_ids: HashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(entity: EntityKind) -> Self {
        Self {
            fail_on: Some(entity),
            ..Self::default()
        }
    }
}

impl RelationalSink for MemorySink {
    fn max_parameters(&self) -> usize {
        self.max_parameters.unwrap_or(DEFAULT_MAX_PARAMETERS)
    }

    fn insert_batch(&mut self, batch: RowBatch<'_>) -> Result<(), IngestError> {
        let entity = batch.entity();
        if self.fail_on == Some(entity) {
            return Err(IngestError::Sink {
                entity: entity.to_string(),
                message: "simulated failure".to_string(),
            });
        }
        let size = batch.len();
        match batch {
            RowBatch::Deployments(rows) => {
                self.deployment_ids
                    .extend(rows.iter().map(|row| row.deployment_id.clone()));
                self.deployments.extend_from_slice(rows);
            }
            RowBatch::Media(rows) => {
                if let Some(orphan) = rows.iter().find(|row| {
                    row.deployment_id
                        .as_ref()
                        .is_some_and(|id| !self.deployment_ids.contains(id))
                }) {
                    return Err(IngestError::Sink {
                        entity: entity.to_string(),
                        message: format!(
                            "FOREIGN KEY constraint failed for media {}",
                            orphan.media_id
                        ),
                    });
                }
                self.media.extend_from_slice(rows);
            }
            RowBatch::Observations(rows) => self.observations.extend_from_slice(rows),
        }
        self.batches.push((entity, size));
        Ok(())
    }

    fn write_metadata(&mut self, metadata: &StudyMetadata) -> Result<(), IngestError> {
        self.metadata = Some(metadata.clone());
        Ok(())
    }
}
