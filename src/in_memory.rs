//! Single-parse import for corpora below the streaming threshold.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::info;

use crate::batch::BatchWriter;
use crate::bounds::BoundsAccumulator;
use crate::domain::{EntityKind, SourceAnnotation, SourceCategory, SourceImage, StagedImage};
use crate::error::IngestError;
use crate::json_stream::open_source;
use crate::progress::{Reporter, Stage};
use crate::resolver::{AnnotationResolver, category_map};
use crate::strategy::ImportOutcome;
use crate::transform::media_row;

/// The three COCO arrays after validation, still as raw JSON.
pub struct CocoDocument {
    pub images: Vec<Value>,
    pub annotations: Vec<Value>,
    pub categories: Vec<Value>,
}

impl CocoDocument {
    pub fn read(path: &Path) -> Result<Self, IngestError> {
        let mut bytes = Vec::new();
        open_source(path)?
            .read_to_end(&mut bytes)
            .map_err(|err| IngestError::Filesystem(format!("read {}: {err}", path.display())))?;
        Self::parse(&bytes)
    }

    /// Parses and validates the document before anything is written. Every
    /// member is checked here, so a malformed sibling such as `info` fails this
    /// path; the streaming path only validates the arrays it selects.
    pub fn parse(bytes: &[u8]) -> Result<Self, IngestError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|err| IngestError::MalformedJson(err.to_string()))?;
        let Value::Object(mut root) = value else {
            return Err(IngestError::MalformedJson(
                "top-level value is not an object".to_string(),
            ));
        };
        let images = take_array(&mut root, "images")?
            .ok_or_else(|| IngestError::MissingArray("images".to_string()))?;
        let annotations = take_array(&mut root, "annotations")?.unwrap_or_default();
        let categories = take_array(&mut root, "categories")?.unwrap_or_default();
        Ok(Self {
            images,
            annotations,
            categories,
        })
    }
}

fn take_array(root: &mut Map<String, Value>, key: &str) -> Result<Option<Vec<Value>>, IngestError> {
    match root.remove(key) {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(IngestError::NotAnArray(key.to_string())),
    }
}

fn typed<T: DeserializeOwned>(key: &str, items: Vec<Value>) -> Result<Vec<T>, IngestError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item)
                .map_err(|err| IngestError::MalformedJson(format!("{key}[{index}]: {err}")))
        })
        .collect()
}

pub fn run(
    source: &Path,
    image_base_url: &str,
    writer: &mut BatchWriter<'_>,
    reporter: &Reporter<'_>,
) -> Result<ImportOutcome, IngestError> {
    reporter.stage(Stage::Parsing);
    let document = CocoDocument::read(source)?;
    let images: Vec<SourceImage> = typed("images", document.images)?;
    let annotations: Vec<SourceAnnotation> = typed("annotations", document.annotations)?;
    let categories: Vec<SourceCategory> = typed("categories", document.categories)?;
    info!(
        images = images.len(),
        annotations = annotations.len(),
        categories = categories.len(),
        "parsed source document"
    );

    let categories = category_map(categories.into_iter().map(Ok))?;
    let mut accumulator = BoundsAccumulator::new();
    let staged: Vec<StagedImage> = images
        .into_iter()
        .map(|image| accumulator.observe(image))
        .collect();
    let image_count = accumulator.image_count();

    reporter.stage(Stage::Importing);
    let deployments = accumulator.deployments();
    let written = writer.write_deployments(&deployments)?;
    reporter.rows(
        EntityKind::Deployments,
        written,
        Some(deployments.len() as u64),
    );

    let media = staged
        .iter()
        .map(|image| media_row(image, image_base_url))
        .collect::<Vec<_>>();
    let written = writer.write_media(&media)?;
    reporter.rows(EntityKind::Media, written, Some(media.len() as u64));
    drop(media);

    let index: HashMap<String, StagedImage> = staged
        .into_iter()
        .map(|image| (image.id.clone(), image))
        .collect();
    let sequences = accumulator.into_sequences();
    let mut resolver = AnnotationResolver::new(&categories, &index, &sequences);
    let observations = annotations
        .iter()
        .enumerate()
        .filter_map(|(ordinal, annotation)| resolver.resolve(ordinal as u64, annotation))
        .collect::<Vec<_>>();
    let written = writer.write_observations(&observations)?;
    reporter.rows(
        EntityKind::Observations,
        written,
        Some(observations.len() as u64),
    );

    let stats = resolver.stats();
    reporter.detail(stats.summary());
    Ok(ImportOutcome {
        images: image_count,
        counts: writer.counts(),
        stats,
    })
}
