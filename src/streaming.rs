//! Memory-bounded import for large corpora.
//!
//! The source is re-opened once per array: categories, then images (folded into
//! the bounds accumulator and written to the staging store), then annotations
//! (resolved against an index loaded back from the staging store). Elements are
//! pulled in fixed-size chunks and each chunk is flushed downstream before the
//! next is pulled, so in-flight rows never exceed one chunk.

use std::path::Path;

use tracing::{debug, info};

use crate::batch::BatchWriter;
use crate::bounds::BoundsAccumulator;
use crate::domain::{EntityKind, SourceAnnotation, SourceCategory, SourceImage};
use crate::error::IngestError;
use crate::json_stream::stream_array;
use crate::progress::{Reporter, Stage};
use crate::resolver::{AnnotationResolver, category_map};
use crate::staging::StagingStore;
use crate::strategy::ImportOutcome;
use crate::transform::media_row;

#[derive(Debug, Clone, Copy)]
pub struct ChunkSizes {
    pub images: usize,
    pub annotations: usize,
}

/// Pulls up to `size` items (at least one). An empty vec means the source is
/// exhausted.
pub fn next_chunk<I, T>(items: &mut I, size: usize) -> Result<Vec<T>, IngestError>
where
    I: Iterator<Item = Result<T, IngestError>>,
{
    let size = size.max(1);
    let mut chunk = Vec::with_capacity(size);
    for item in items.by_ref().take(size) {
        chunk.push(item?);
    }
    Ok(chunk)
}

pub fn run(
    source: &Path,
    image_base_url: &str,
    staging: &mut StagingStore,
    chunks: ChunkSizes,
    writer: &mut BatchWriter<'_>,
    reporter: &Reporter<'_>,
) -> Result<ImportOutcome, IngestError> {
    reporter.stage(Stage::Parsing);
    let categories = match stream_array::<SourceCategory>(source, "categories")? {
        Some(stream) => category_map(stream)?,
        None => Default::default(),
    };
    debug!(categories = categories.len(), "categories loaded");

    let accumulator = accumulate_images(source, staging, chunks.images, reporter)?;
    let image_count = accumulator.image_count();
    info!(
        images = image_count,
        locations = accumulator.location_count(),
        sequences = accumulator.sequence_count(),
        "bounds computed"
    );

    reporter.stage(Stage::Importing);
    let deployments = accumulator.deployments();
    let written = writer.write_deployments(&deployments)?;
    reporter.rows(EntityKind::Deployments, written, Some(deployments.len() as u64));
    drop(deployments);
    let sequences = accumulator.into_sequences();

    let mut staged = staging.read()?;
    let mut media_written = 0u64;
    loop {
        let chunk = next_chunk(&mut staged, chunks.images)?;
        if chunk.is_empty() {
            break;
        }
        let rows = chunk
            .iter()
            .map(|image| media_row(image, image_base_url))
            .collect::<Vec<_>>();
        media_written += writer.write_media(&rows)?;
        reporter.rows(EntityKind::Media, media_written, Some(staging.len()));
    }

    let index = staging.load_index()?;
    debug!(entries = index.len(), "image index loaded");
    let mut resolver = AnnotationResolver::new(&categories, &index, &sequences);
    if let Some(mut annotations) = stream_array::<SourceAnnotation>(source, "annotations")? {
        let mut ordinal = 0u64;
        let mut observations_written = 0u64;
        loop {
            let chunk = next_chunk(&mut annotations, chunks.annotations)?;
            if chunk.is_empty() {
                break;
            }
            let mut rows = Vec::with_capacity(chunk.len());
            for annotation in &chunk {
                if let Some(row) = resolver.resolve(ordinal, annotation) {
                    rows.push(row);
                }
                ordinal += 1;
            }
            observations_written += writer.write_observations(&rows)?;
            reporter.rows(EntityKind::Observations, observations_written, None);
            reporter.detail(format!("{ordinal} annotations processed"));
        }
    }

    let stats = resolver.stats();
    reporter.detail(stats.summary());
    Ok(ImportOutcome {
        images: image_count,
        counts: writer.counts(),
        stats,
    })
}

/// First pass over `images`: widens the bounds and stages each projection.
pub fn accumulate_images(
    source: &Path,
    staging: &mut StagingStore,
    chunk_size: usize,
    reporter: &Reporter<'_>,
) -> Result<BoundsAccumulator, IngestError> {
    let mut images = stream_array::<SourceImage>(source, "images")?
        .ok_or_else(|| IngestError::MissingArray("images".to_string()))?;
    let mut accumulator = BoundsAccumulator::new();
    loop {
        let chunk = next_chunk(&mut images, chunk_size)?;
        if chunk.is_empty() {
            break;
        }
        let staged = chunk
            .into_iter()
            .map(|image| accumulator.observe(image))
            .collect::<Vec<_>>();
        staging.append_chunk(&staged)?;
        reporter.detail(format!(
            "computing bounds: {} images scanned",
            accumulator.image_count()
        ));
    }
    Ok(accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_chunk_stops_on_error() {
        let mut items = vec![
            Ok(1),
            Err(IngestError::MalformedJson("bad".to_string())),
            Ok(3),
        ]
        .into_iter();
        assert!(next_chunk(&mut items, 5).is_err());
    }

    #[test]
    fn next_chunk_drains_in_pieces() {
        let mut items = (0..5).map(Ok::<_, IngestError>);
        assert_eq!(next_chunk(&mut items, 2).unwrap(), vec![0, 1]);
        assert_eq!(next_chunk(&mut items, 2).unwrap(), vec![2, 3]);
        assert_eq!(next_chunk(&mut items, 2).unwrap(), vec![4]);
        assert!(next_chunk(&mut items, 2).unwrap().is_empty());
    }

    #[test]
    fn zero_chunk_size_still_makes_progress() {
        let mut items = (0..2).map(Ok::<_, IngestError>);
        assert_eq!(next_chunk(&mut items, 0).unwrap(), vec![0]);
        assert_eq!(next_chunk(&mut items, 0).unwrap(), vec![1]);
        assert!(next_chunk(&mut items, 0).unwrap().is_empty());
    }
}
