use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::domain::StagedImage;
use crate::error::IngestError;

/// Append-only JSONL file of [`StagedImage`] projections for one import run.
///
/// The file lives under the staging dir with the study id in its name and is
/// removed when the store is dropped, whether the import succeeded or not.
pub struct StagingStore {
    file: NamedTempFile,
    lines: u64,
}

impl StagingStore {
    pub fn create(staging_dir: &Path, study_id: &str) -> Result<Self, IngestError> {
        std::fs::create_dir_all(staging_dir)
            .map_err(|err| IngestError::Staging(format!("{}: {err}", staging_dir.display())))?;
        let file = tempfile::Builder::new()
            .prefix(&format!("camtrap-{}-images-", file_safe(study_id)))
            .suffix(".jsonl")
            .tempfile_in(staging_dir)
            .map_err(|err| IngestError::Staging(err.to_string()))?;
        Ok(Self { file, lines: 0 })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }

    /// Appends one chunk and flushes it before returning.
    pub fn append_chunk(&mut self, images: &[StagedImage]) -> Result<(), IngestError> {
        let mut writer = BufWriter::new(self.file.as_file_mut());
        for image in images {
            serde_json::to_writer(&mut writer, image)
                .map_err(|err| IngestError::Staging(err.to_string()))?;
            writer
                .write_all(b"\n")
                .map_err(|err| IngestError::Staging(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| IngestError::Staging(err.to_string()))?;
        self.lines += images.len() as u64;
        Ok(())
    }

    /// Re-reads the projections in append order.
    pub fn read(&self) -> Result<StagedLines, IngestError> {
        let file = File::open(self.path())
            .map_err(|err| IngestError::Staging(format!("{}: {err}", self.path().display())))?;
        Ok(StagedLines {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    /// Loads every projection into an id-keyed index for random access.
    pub fn load_index(&self) -> Result<HashMap<String, StagedImage>, IngestError> {
        let mut index = HashMap::with_capacity(self.lines as usize);
        for image in self.read()? {
            let image = image?;
            index.insert(image.id.clone(), image);
        }
        Ok(index)
    }

    pub fn close(self) -> Result<(), IngestError> {
        self.file
            .close()
            .map_err(|err| IngestError::Staging(err.to_string()))
    }
}

pub struct StagedLines {
    lines: Lines<BufReader<File>>,
    line_no: u64,
}

impl Iterator for StagedLines {
    type Item = Result<StagedImage, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(IngestError::Staging(err.to_string()))),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(|err| {
                IngestError::Staging(format!("line {}: {err}", self.line_no))
            }));
        }
    }
}

fn file_safe(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
