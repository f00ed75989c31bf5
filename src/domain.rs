use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Static description of a hosted camera-trap corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub metadata_url: &'static str,
    pub image_base_url: &'static str,
    pub is_archived: bool,
    pub image_count: u64,
    pub category_count: u32,
}

/// COCO `images[]` element.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceImage {
    #[serde(deserialize_with = "required_key")]
    pub id: String,
    pub file_name: String,
    #[serde(default, deserialize_with = "optional_key")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "optional_key")]
    pub seq_id: Option<String>,
    #[serde(default, deserialize_with = "optional_key")]
    pub datetime: Option<String>,
    #[serde(default, deserialize_with = "optional_number")]
    pub width: Option<f64>,
    #[serde(default, deserialize_with = "optional_number")]
    pub height: Option<f64>,
}

/// COCO `annotations[]` element.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceAnnotation {
    #[serde(default, deserialize_with = "optional_key")]
    pub id: Option<String>,
    #[serde(deserialize_with = "required_key")]
    pub image_id: String,
    #[serde(deserialize_with = "required_key")]
    pub category_id: String,
    #[serde(default, deserialize_with = "optional_numbers")]
    pub bbox: Option<Vec<Option<f64>>>,
}

/// COCO `categories[]` element.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceCategory {
    #[serde(deserialize_with = "required_key")]
    pub id: String,
    pub name: String,
}

/// Compact per-image projection shuttled between the two streaming passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedImage {
    pub id: String,
    pub location: Option<String>,
    pub seq_id: Option<String>,
    pub datetime: Option<String>,
    pub file_name: String,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    #[serde(rename = "deploymentID")]
    pub deployment_id: String,
    #[serde(rename = "locationID")]
    pub location_id: String,
    pub location_name: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(rename = "mediaID")]
    pub media_id: String,
    #[serde(rename = "deploymentID")]
    pub deployment_id: Option<String>,
    pub timestamp: Option<String>,
    pub file_path: String,
    pub file_name: String,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(rename = "observationID")]
    pub observation_id: String,
    #[serde(rename = "mediaID")]
    pub media_id: String,
    #[serde(rename = "deploymentID")]
    pub deployment_id: Option<String>,
    #[serde(rename = "eventID")]
    pub event_id: Option<String>,
    pub event_start: Option<String>,
    pub event_end: Option<String>,
    pub scientific_name: Option<String>,
    pub common_name: Option<String>,
    pub observation_type: String,
    pub count: u32,
    pub bbox_x: Option<f64>,
    pub bbox_y: Option<f64>,
    pub bbox_width: Option<f64>,
    pub bbox_height: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Deployments,
    Media,
    Observations,
}

impl EntityKind {
    pub fn column_count(self) -> usize {
        match self {
            EntityKind::Deployments => 7,
            EntityKind::Media => 6,
            EntityKind::Observations => 14,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Deployments => write!(f, "deployments"),
            EntityKind::Media => write!(f, "media"),
            EntityKind::Observations => write!(f, "observations"),
        }
    }
}

/// Rows in the order the sink must receive them.
#[derive(Debug, Clone, Copy)]
pub enum RowBatch<'a> {
    Deployments(&'a [Deployment]),
    Media(&'a [Media]),
    Observations(&'a [Observation]),
}

impl RowBatch<'_> {
    pub fn entity(&self) -> EntityKind {
        match self {
            RowBatch::Deployments(_) => EntityKind::Deployments,
            RowBatch::Media(_) => EntityKind::Media,
            RowBatch::Observations(_) => EntityKind::Observations,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowBatch::Deployments(rows) => rows.len(),
            RowBatch::Media(rows) => rows.len(),
            RowBatch::Observations(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identifier fields in COCO exports are strings in some corpora and integers in others.
fn key_from_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    }
}

/// Dimensions and box members arrive as numbers, numeric strings or junk.
/// Junk becomes `None` so the row is kept and the box left unnormalized.
fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_from_value(&Value::deserialize(deserializer)?))
}

fn optional_numbers<'de, D>(deserializer: D) -> Result<Option<Vec<Option<f64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(items.iter().map(number_from_value).collect()),
        _ => None,
    })
}

fn optional_key<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(key_from_value(Value::deserialize(deserializer)?))
}

fn required_key<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    key_from_value(Value::deserialize(deserializer)?)
        .ok_or_else(|| serde::de::Error::custom("identifier must not be null"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids_are_stringified() {
        let image: SourceImage = serde_json::from_str(
            r#"{"id": 42, "file_name": "a.jpg", "location": 7, "seq_id": "s1"}"#,
        )
        .unwrap();
        assert_eq!(image.id, "42");
        assert_eq!(image.location.as_deref(), Some("7"));
        assert_eq!(image.seq_id.as_deref(), Some("s1"));
        assert!(image.datetime.is_none());
    }

    #[test]
    fn null_bbox_members_survive_parsing() {
        let ann: SourceAnnotation = serde_json::from_str(
            r#"{"image_id": "x", "category_id": 1, "bbox": [1.0, null, 3, 4]}"#,
        )
        .unwrap();
        assert!(ann.id.is_none());
        assert_eq!(ann.category_id, "1");
        assert_eq!(ann.bbox.unwrap()[1], None);
    }

    #[test]
    fn numeric_strings_and_junk_dimensions_parse_leniently() {
        let image: SourceImage = serde_json::from_str(
            r#"{"id": 1, "file_name": "a.jpg", "width": " 640 ", "height": {"px": 480}}"#,
        )
        .unwrap();
        assert_eq!(image.width, Some(640.0));
        assert_eq!(image.height, None);

        let ann: SourceAnnotation = serde_json::from_str(
            r#"{"image_id": "x", "category_id": 1, "bbox": ["1", 2, "wide", true]}"#,
        )
        .unwrap();
        assert_eq!(ann.bbox.unwrap(), vec![Some(1.0), Some(2.0), None, None]);

        let ann: SourceAnnotation =
            serde_json::from_str(r#"{"image_id": "x", "category_id": 1, "bbox": "0,0,1,1"}"#)
                .unwrap();
        assert!(ann.bbox.is_none());
    }

    #[test]
    fn null_image_id_is_rejected() {
        let err = serde_json::from_str::<SourceAnnotation>(r#"{"image_id": null, "category_id": 1}"#);
        assert!(err.is_err());
    }
}
