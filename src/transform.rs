//! Row-level normalization shared by the in-memory and streaming strategies.
//! Both paths must produce identical rows, so every conversion lives here.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::domain::{Deployment, Media, StagedImage};

const BLANK_CATEGORIES: &[&str] = &["empty", "blank", "nothing"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parses the datetime spellings found in COCO camera-trap exports.
/// Values without an offset are taken as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn normalize_datetime(raw: Option<&str>) -> Option<String> {
    raw.and_then(parse_datetime).map(|value| format_timestamp(&value))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    pub fn denormalize(&self, image_width: f64, image_height: f64) -> [f64; 4] {
        [
            self.x * image_width,
            self.y * image_height,
            self.width * image_width,
            self.height * image_height,
        ]
    }
}

/// Converts a pixel-space `[x, y, w, h]` box into unit-interval coordinates.
/// Returns `None` when the box or either image dimension is unusable.
pub fn normalize_bbox(
    bbox: Option<&[Option<f64>]>,
    image_width: Option<f64>,
    image_height: Option<f64>,
) -> Option<NormalizedBox> {
    let bbox = bbox?;
    if bbox.len() < 4 {
        return None;
    }
    let width = image_width.filter(|w| w.is_finite() && *w > 0.0)?;
    let height = image_height.filter(|h| h.is_finite() && *h > 0.0)?;
    let mut values = [0.0f64; 4];
    for (slot, value) in values.iter_mut().zip(bbox) {
        *slot = value.filter(|v| v.is_finite())?;
    }
    Some(NormalizedBox {
        x: values[0] / width,
        y: values[1] / height,
        width: values[2] / width,
        height: values[3] / height,
    })
}

pub fn is_blank_category(name: &str) -> bool {
    let normalized = name.trim().to_lowercase();
    BLANK_CATEGORIES.contains(&normalized.as_str())
}

pub fn observation_type(category: Option<&str>) -> &'static str {
    let Some(name) = category else {
        return "unclassified";
    };
    match name.trim().to_lowercase().as_str() {
        "human" | "humans" | "person" | "people" => "human",
        "vehicle" | "vehicles" | "car" => "vehicle",
        _ => "animal",
    }
}

pub fn media_type(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        _ => "image/jpeg",
    }
}

pub fn media_file_path(base_url: &str, file_name: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{}", file_name.trim_start_matches('/'))
    } else {
        format!("{base_url}{file_name}")
    }
}

pub fn media_row(image: &StagedImage, base_url: &str) -> Media {
    Media {
        media_id: image.id.clone(),
        deployment_id: image.location.clone(),
        timestamp: image.datetime.clone(),
        file_path: media_file_path(base_url, &image.file_name),
        file_name: image.file_name.clone(),
        media_type: media_type(&image.file_name).to_string(),
    }
}

pub fn deployment_row(
    location: &str,
    start: Option<&DateTime<Utc>>,
    end: Option<&DateTime<Utc>>,
) -> Deployment {
    Deployment {
        deployment_id: location.to_string(),
        location_id: location.to_string(),
        location_name: location.to_string(),
        start: start.map(format_timestamp),
        end: end.map(format_timestamp),
        latitude: None,
        longitude: None,
    }
}

/// Observation id used when the source annotation has none. `ordinal` is the
/// annotation's position in the source array, which both strategies share.
pub fn fallback_observation_id(media_id: &str, ordinal: u64) -> String {
    format!("{media_id}_obs{ordinal}")
}
