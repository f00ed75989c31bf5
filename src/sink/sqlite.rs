use std::fs;
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};

use crate::domain::{Deployment, EntityKind, Media, Observation, RowBatch};
use crate::error::IngestError;
use crate::sink::{DEFAULT_MAX_PARAMETERS, RelationalSink, StudyMetadata};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS deployments (
    deployment_id TEXT PRIMARY KEY,
    location_id TEXT,
    location_name TEXT,
    deployment_start TEXT,
    deployment_end TEXT,
    latitude REAL,
    longitude REAL
);

CREATE TABLE IF NOT EXISTS media (
    media_id TEXT PRIMARY KEY,
    deployment_id TEXT REFERENCES deployments(deployment_id),
    timestamp TEXT,
    file_path TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_mediatype TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS observations (
    observation_id TEXT PRIMARY KEY,
    media_id TEXT NOT NULL,
    deployment_id TEXT,
    event_id TEXT,
    event_start TEXT,
    event_end TEXT,
    scientific_name TEXT,
    common_name TEXT,
    observation_type TEXT NOT NULL,
    count INTEGER NOT NULL,
    bbox_x REAL,
    bbox_y REAL,
    bbox_width REAL,
    bbox_height REAL
);

CREATE INDEX IF NOT EXISTS idx_media_deployment ON media(deployment_id);
CREATE INDEX IF NOT EXISTS idx_observations_media ON observations(media_id);

CREATE TABLE IF NOT EXISTS study_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const DEPLOYMENT_COLUMNS: &str = "deployment_id, location_id, location_name, deployment_start, deployment_end, latitude, longitude";
const MEDIA_COLUMNS: &str =
    "media_id, deployment_id, timestamp, file_path, file_name, file_mediatype";
const OBSERVATION_COLUMNS: &str = "observation_id, media_id, deployment_id, event_id, event_start, event_end, scientific_name, common_name, observation_type, count, bbox_x, bbox_y, bbox_width, bbox_height";

pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| IngestError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(schema_error)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(schema_error)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, IngestError> {
        Self::init(Connection::open_in_memory().map_err(schema_error)?)
    }

    fn init(conn: Connection) -> Result<Self, IngestError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(schema_error)?;
        conn.execute_batch(SCHEMA).map_err(schema_error)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn count(&self, entity: EntityKind) -> Result<u64, IngestError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table_name(entity));
        self.conn
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map(|count| count as u64)
            .map_err(|err| sink_error(entity, err))
    }

    pub fn metadata(&self) -> Result<Option<StudyMetadata>, IngestError> {
        let raw: Option<String> = match self.conn.query_row(
            "SELECT value FROM study_metadata WHERE key = 'study'",
            [],
            |row| row.get(0),
        ) {
            Ok(value) => Some(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(err) => return Err(schema_error(err)),
        };
        raw.map(|json| {
            serde_json::from_str(&json).map_err(|err| IngestError::Sink {
                entity: "study_metadata".to_string(),
                message: err.to_string(),
            })
        })
        .transpose()
    }

    fn insert_rows(
        &self,
        entity: EntityKind,
        columns: &str,
        rows: usize,
        values: Vec<Value>,
    ) -> Result<(), IngestError> {
        if rows == 0 {
            return Ok(());
        }
        let width = entity.column_count();
        let placeholder = format!("({})", vec!["?"; width].join(", "));
        let sql = format!(
            "INSERT INTO {} ({columns}) VALUES {}",
            table_name(entity),
            vec![placeholder.as_str(); rows].join(", ")
        );
        self.conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(|err| sink_error(entity, err))?;
        Ok(())
    }
}

impl RelationalSink for SqliteSink {
    fn max_parameters(&self) -> usize {
        DEFAULT_MAX_PARAMETERS
    }

    fn insert_batch(&mut self, batch: RowBatch<'_>) -> Result<(), IngestError> {
        let entity = batch.entity();
        match batch {
            RowBatch::Deployments(rows) => self.insert_rows(
                entity,
                DEPLOYMENT_COLUMNS,
                rows.len(),
                rows.iter().flat_map(deployment_values).collect(),
            ),
            RowBatch::Media(rows) => self.insert_rows(
                entity,
                MEDIA_COLUMNS,
                rows.len(),
                rows.iter().flat_map(media_values).collect(),
            ),
            RowBatch::Observations(rows) => self.insert_rows(
                entity,
                OBSERVATION_COLUMNS,
                rows.len(),
                rows.iter().flat_map(observation_values).collect(),
            ),
        }
    }

    fn write_metadata(&mut self, metadata: &StudyMetadata) -> Result<(), IngestError> {
        let json = serde_json::to_string(metadata).map_err(|err| IngestError::Sink {
            entity: "study_metadata".to_string(),
            message: err.to_string(),
        })?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO study_metadata (key, value) VALUES ('study', ?1)",
                params![json],
            )
            .map_err(schema_error)?;
        Ok(())
    }
}

fn table_name(entity: EntityKind) -> &'static str {
    match entity {
        EntityKind::Deployments => "deployments",
        EntityKind::Media => "media",
        EntityKind::Observations => "observations",
    }
}

fn text(value: &Option<String>) -> Value {
    value.clone().map(Value::Text).unwrap_or(Value::Null)
}

fn real(value: Option<f64>) -> Value {
    value.map(Value::Real).unwrap_or(Value::Null)
}

fn deployment_values(row: &Deployment) -> [Value; 7] {
    [
        Value::Text(row.deployment_id.clone()),
        Value::Text(row.location_id.clone()),
        Value::Text(row.location_name.clone()),
        text(&row.start),
        text(&row.end),
        real(row.latitude),
        real(row.longitude),
    ]
}

fn media_values(row: &Media) -> [Value; 6] {
    [
        Value::Text(row.media_id.clone()),
        text(&row.deployment_id),
        text(&row.timestamp),
        Value::Text(row.file_path.clone()),
        Value::Text(row.file_name.clone()),
        Value::Text(row.media_type.clone()),
    ]
}

fn observation_values(row: &Observation) -> [Value; 14] {
    [
        Value::Text(row.observation_id.clone()),
        Value::Text(row.media_id.clone()),
        text(&row.deployment_id),
        text(&row.event_id),
        text(&row.event_start),
        text(&row.event_end),
        text(&row.scientific_name),
        text(&row.common_name),
        Value::Text(row.observation_type.clone()),
        Value::Integer(i64::from(row.count)),
        real(row.bbox_x),
        real(row.bbox_y),
        real(row.bbox_width),
        real(row.bbox_height),
    ]
}

fn sink_error(entity: EntityKind, err: rusqlite::Error) -> IngestError {
    IngestError::Sink {
        entity: entity.to_string(),
        message: err.to_string(),
    }
}

fn schema_error(err: rusqlite::Error) -> IngestError {
    IngestError::Sink {
        entity: "schema".to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_requires_an_existing_deployment() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let media = Media {
            media_id: "1".to_string(),
            deployment_id: Some("missing".to_string()),
            timestamp: None,
            file_path: "https://x/a.jpg".to_string(),
            file_name: "a.jpg".to_string(),
            media_type: "image/jpeg".to_string(),
        };
        let err = sink.insert_batch(RowBatch::Media(&[media])).unwrap_err();
        assert!(matches!(err, IngestError::Sink { .. }));
        assert_eq!(sink.count(EntityKind::Media).unwrap(), 0);
    }

    #[test]
    fn column_lists_match_declared_widths() {
        for (entity, columns) in [
            (EntityKind::Deployments, DEPLOYMENT_COLUMNS),
            (EntityKind::Media, MEDIA_COLUMNS),
            (EntityKind::Observations, OBSERVATION_COLUMNS),
        ] {
            assert_eq!(columns.split(',').count(), entity.column_count());
        }
    }
}
