use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bounds::SequenceBounds;
use crate::domain::{Observation, SourceAnnotation, SourceCategory, StagedImage};
use crate::error::IngestError;
use crate::transform::{
    fallback_observation_id, format_timestamp, is_blank_category, normalize_bbox,
    observation_type,
};

/// Rows dropped or degraded during resolution. None of these are errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveStats {
    pub annotations: u64,
    pub observations: u64,
    pub unknown_image: u64,
    pub blank_category: u64,
    pub unknown_category: u64,
    pub invalid_bbox: u64,
}

impl ResolveStats {
    pub fn summary(&self) -> String {
        format!(
            "{} annotations, {} observations; skipped {} unknown image, {} blank; {} unknown category, {} without usable bbox",
            self.annotations,
            self.observations,
            self.unknown_image,
            self.blank_category,
            self.unknown_category,
            self.invalid_bbox
        )
    }
}

pub fn category_map<I>(categories: I) -> Result<HashMap<String, String>, IngestError>
where
    I: IntoIterator<Item = Result<SourceCategory, IngestError>>,
{
    let mut map = HashMap::new();
    for category in categories {
        let category = category?;
        map.insert(category.id, category.name);
    }
    Ok(map)
}

/// Turns annotations into observation rows against a random-access image index.
pub struct AnnotationResolver<'a> {
    categories: &'a HashMap<String, String>,
    images: &'a HashMap<String, StagedImage>,
    sequences: &'a SequenceBounds,
    stats: ResolveStats,
}

impl<'a> AnnotationResolver<'a> {
    pub fn new(
        categories: &'a HashMap<String, String>,
        images: &'a HashMap<String, StagedImage>,
        sequences: &'a SequenceBounds,
    ) -> Self {
        Self {
            categories,
            images,
            sequences,
            stats: ResolveStats::default(),
        }
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    /// `ordinal` is the annotation's index in the source array.
    pub fn resolve(&mut self, ordinal: u64, annotation: &SourceAnnotation) -> Option<Observation> {
        self.stats.annotations += 1;

        let Some(image) = self.images.get(&annotation.image_id) else {
            self.stats.unknown_image += 1;
            return None;
        };

        let category = self.categories.get(&annotation.category_id);
        match category {
            Some(name) if is_blank_category(name) => {
                self.stats.blank_category += 1;
                return None;
            }
            None => self.stats.unknown_category += 1,
            Some(_) => {}
        }

        let bbox = normalize_bbox(annotation.bbox.as_deref(), image.width, image.height);
        if bbox.is_none() && annotation.bbox.is_some() {
            self.stats.invalid_bbox += 1;
        }

        let (event_start, event_end) = match image
            .seq_id
            .as_deref()
            .and_then(|seq_id| self.sequences.get(seq_id))
        {
            Some(bounds) => (
                Some(format_timestamp(&bounds.start)),
                Some(format_timestamp(&bounds.end)),
            ),
            None => (image.datetime.clone(), image.datetime.clone()),
        };

        self.stats.observations += 1;
        Some(Observation {
            observation_id: annotation
                .id
                .clone()
                .unwrap_or_else(|| fallback_observation_id(&image.id, ordinal)),
            media_id: image.id.clone(),
            deployment_id: image.location.clone(),
            event_id: image.seq_id.clone(),
            event_start,
            event_end,
            scientific_name: category.cloned(),
            common_name: category.cloned(),
            observation_type: observation_type(category.map(String::as_str)).to_string(),
            count: 1,
            bbox_x: bbox.map(|b| b.x),
            bbox_y: bbox.map(|b| b.y),
            bbox_width: bbox.map(|b| b.width),
            bbox_height: bbox.map(|b| b.height),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::BoundsAccumulator;
    use crate::domain::SourceImage;

    fn source_image(id: &str, seq: Option<&str>, dt: &str) -> SourceImage {
        SourceImage {
            id: id.to_string(),
            file_name: format!("{id}.jpg"),
            location: Some("loc".to_string()),
            seq_id: seq.map(str::to_string),
            datetime: Some(dt.to_string()),
            width: Some(100.0),
            height: Some(50.0),
        }
    }

    fn annotation(image_id: &str, category_id: &str, bbox: Option<[f64; 4]>) -> SourceAnnotation {
        SourceAnnotation {
            id: None,
            image_id: image_id.to_string(),
            category_id: category_id.to_string(),
            bbox: bbox.map(|b| b.iter().copied().map(Some).collect()),
        }
    }

    struct Fixture {
        categories: HashMap<String, String>,
        images: HashMap<String, StagedImage>,
        sequences: SequenceBounds,
    }

    fn fixture() -> Fixture {
        let mut acc = BoundsAccumulator::new();
        let mut images = HashMap::new();
        for image in [
            source_image("a", Some("s1"), "2020-05-05 10:00:00"),
            source_image("b", Some("s1"), "2020-05-05 10:00:04"),
            source_image("c", None, "2020-05-06 08:00:00"),
        ] {
            let staged = acc.observe(image);
            images.insert(staged.id.clone(), staged);
        }
        let categories = HashMap::from([
            ("1".to_string(), "Deer".to_string()),
            ("0".to_string(), " Empty".to_string()),
        ]);
        Fixture {
            categories,
            images,
            sequences: acc.into_sequences(),
        }
    }

    #[test]
    fn event_bounds_come_from_the_sequence() {
        let f = fixture();
        let mut resolver = AnnotationResolver::new(&f.categories, &f.images, &f.sequences);
        let obs = resolver
            .resolve(0, &annotation("a", "1", Some([10.0, 5.0, 50.0, 25.0])))
            .unwrap();
        assert_eq!(obs.event_id.as_deref(), Some("s1"));
        assert_eq!(obs.event_start.as_deref(), Some("2020-05-05T10:00:00.000Z"));
        assert_eq!(obs.event_end.as_deref(), Some("2020-05-05T10:00:04.000Z"));
        assert_eq!(obs.bbox_x, Some(0.1));
        assert_eq!(obs.bbox_height, Some(0.5));
        assert_eq!(obs.observation_id, "a_obs0");
        assert_eq!(obs.observation_type, "animal");
    }

    #[test]
    fn images_without_sequence_fall_back_to_own_datetime() {
        let f = fixture();
        let mut resolver = AnnotationResolver::new(&f.categories, &f.images, &f.sequences);
        let obs = resolver.resolve(3, &annotation("c", "1", None)).unwrap();
        assert_eq!(obs.event_id, None);
        assert_eq!(obs.event_start.as_deref(), Some("2020-05-06T08:00:00.000Z"));
        assert_eq!(obs.event_end, obs.event_start);
        assert_eq!(obs.bbox_x, None);
    }

    #[test]
    fn skips_are_counted_not_raised() {
        let f = fixture();
        let mut resolver = AnnotationResolver::new(&f.categories, &f.images, &f.sequences);
        assert!(resolver.resolve(0, &annotation("zzz", "1", None)).is_none());
        assert!(resolver.resolve(1, &annotation("a", "0", None)).is_none());
        let unknown = resolver.resolve(2, &annotation("b", "99", None)).unwrap();
        assert_eq!(unknown.scientific_name, None);
        assert_eq!(unknown.observation_type, "unclassified");

        let stats = resolver.stats();
        assert_eq!(stats.annotations, 3);
        assert_eq!(stats.observations, 1);
        assert_eq!(stats.unknown_image, 1);
        assert_eq!(stats.blank_category, 1);
        assert_eq!(stats.unknown_category, 1);
    }
}
