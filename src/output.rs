use std::io::{self, Write};

use serde::Serialize;

use crate::domain::DatasetDescriptor;
use crate::pipeline::ImportSummary;
use crate::progress::{ProgressEvent, ProgressPayload, ProgressSink, Stage};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_datasets(datasets: &[DatasetDescriptor]) -> io::Result<()> {
        Self::print_json(&datasets)
    }

    pub fn print_summary(summary: &ImportSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Writes one line per stage change, download step or row update to stderr.
pub struct StderrProgress {
    quiet: bool,
}

impl StderrProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        if self.quiet && event.stage != Stage::Error {
            return;
        }
        let line = format_event(&event);
        let _ = writeln!(io::stderr(), "{line}");
    }
}

pub fn format_event(event: &ProgressEvent) -> String {
    let prefix = format!(
        "[{}/{}] {} {}",
        (event.stage_index + 1).min(event.stage_count),
        event.stage_count,
        event.dataset,
        event.stage.name()
    );
    match &event.payload {
        None => prefix,
        Some(ProgressPayload::Download { downloaded, total }) => match total {
            Some(total) if *total > 0 => format!(
                "{prefix}: {} / {} ({}%)",
                human_bytes(*downloaded),
                human_bytes(*total),
                downloaded.saturating_mul(100) / total
            ),
            _ => format!("{prefix}: {}", human_bytes(*downloaded)),
        },
        Some(ProgressPayload::Rows {
            entity,
            inserted,
            total,
        }) => match total {
            Some(total) => format!("{prefix}: {entity} {inserted}/{total}"),
            None => format!("{prefix}: {entity} {inserted}"),
        },
        Some(ProgressPayload::Detail { message }) => format!("{prefix}: {message}"),
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityKind;

    fn event(stage: Stage, payload: Option<ProgressPayload>) -> ProgressEvent {
        ProgressEvent {
            stage,
            stage_index: stage.index(),
            stage_count: Stage::COUNT,
            dataset: "ENA24".to_string(),
            payload,
        }
    }

    #[test]
    fn formats_download_with_percentage() {
        let line = format_event(&event(
            Stage::Downloading,
            Some(ProgressPayload::Download {
                downloaded: 512,
                total: Some(2048),
            }),
        ));
        assert_eq!(line, "[1/4] ENA24 downloading: 512 B / 2.0 KiB (25%)");
    }

    #[test]
    fn formats_rows_without_total() {
        let line = format_event(&event(
            Stage::Importing,
            Some(ProgressPayload::Rows {
                entity: EntityKind::Observations,
                inserted: 42,
                total: None,
            }),
        ));
        assert_eq!(line, "[3/4] ENA24 importing: observations 42");
    }
}
