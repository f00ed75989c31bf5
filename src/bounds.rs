use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::domain::{Deployment, SourceImage, StagedImage};
use crate::transform::{deployment_row, format_timestamp, parse_datetime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeBounds {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            start: instant,
            end: instant,
        }
    }

    pub fn widen(&mut self, instant: DateTime<Utc>) {
        if instant < self.start {
            self.start = instant;
        }
        if instant > self.end {
            self.end = instant;
        }
    }
}

/// Per-sequence and per-location temporal extents, widened one image at a time.
///
/// Sequence entries only exist once an image with a usable datetime has been seen.
/// Location entries exist as soon as any image names the location; their bounds
/// stay empty until a dated image arrives.
#[derive(Debug, Default)]
pub struct BoundsAccumulator {
    sequences: HashMap<String, TimeBounds>,
    locations: BTreeMap<String, Option<TimeBounds>>,
    images: u64,
}

impl BoundsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one image into the aggregates and returns its staged projection.
    pub fn observe(&mut self, image: SourceImage) -> StagedImage {
        let instant = image.datetime.as_deref().and_then(parse_datetime);

        if let (Some(seq_id), Some(instant)) = (image.seq_id.as_ref(), instant) {
            self.sequences
                .entry(seq_id.clone())
                .and_modify(|bounds| bounds.widen(instant))
                .or_insert_with(|| TimeBounds::at(instant));
        }

        if let Some(location) = image.location.as_ref() {
            let slot = self.locations.entry(location.clone()).or_insert(None);
            if let Some(instant) = instant {
                slot.get_or_insert_with(|| TimeBounds::at(instant))
                    .widen(instant);
            }
        }

        self.images += 1;
        StagedImage {
            id: image.id,
            location: image.location,
            seq_id: image.seq_id,
            datetime: instant.as_ref().map(format_timestamp),
            file_name: image.file_name,
            width: image.width,
            height: image.height,
        }
    }

    pub fn image_count(&self) -> u64 {
        self.images
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.locations
            .iter()
            .map(|(location, bounds)| {
                deployment_row(
                    location,
                    bounds.as_ref().map(|b| &b.start),
                    bounds.as_ref().map(|b| &b.end),
                )
            })
            .collect()
    }

    /// Consumes the accumulator, keeping only what annotation resolution needs.
    pub fn into_sequences(self) -> SequenceBounds {
        SequenceBounds {
            inner: self.sequences,
        }
    }
}

#[derive(Debug, Default)]
pub struct SequenceBounds {
    inner: HashMap<String, TimeBounds>,
}

impl SequenceBounds {
    pub fn get(&self, seq_id: &str) -> Option<&TimeBounds> {
        self.inner.get(seq_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
