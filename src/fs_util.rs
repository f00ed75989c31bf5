use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::IngestError;

/// Unpacks every file of `zip_path` under `target_dir` and returns the written
/// paths. Entries that would escape `target_dir` abort the extraction.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| IngestError::Archive(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| IngestError::Archive(err.to_string()))?;

    let mut written = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| IngestError::Archive(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let relative = entry.enclosed_name().ok_or_else(|| {
            IngestError::Archive(format!("entry `{}` escapes the archive root", entry.name()))
        })?;
        let destination = target_dir.join(relative);
        write_entry(&mut entry, &destination)?;
        written.push(destination);
    }
    Ok(written)
}

fn write_entry(entry: &mut impl io::Read, destination: &Path) -> Result<(), IngestError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|err| IngestError::Filesystem(err.to_string()))?;
    }
    let mut out = fs::File::create(destination)
        .map_err(|err| IngestError::Filesystem(format!("{}: {err}", destination.display())))?;
    io::copy(entry, &mut out).map_err(|err| IngestError::Archive(err.to_string()))?;
    Ok(())
}

/// First `.json` file (by path order) under `root`, skipping macOS resource forks.
pub fn find_metadata_json(root: &Path) -> Result<PathBuf, IngestError> {
    let files = walk_dir(root)?
        .into_iter()
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    pick_metadata_json(&files).ok_or_else(|| {
        IngestError::Archive(format!("no JSON metadata found in {}", root.display()))
    })
}

/// The metadata candidate among `files`: lowest `.json` path outside `__MACOSX`.
pub fn pick_metadata_json(files: &[PathBuf]) -> Option<PathBuf> {
    files
        .iter()
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .filter(|path| !path.components().any(|part| part.as_os_str() == "__MACOSX"))
        .min()
        .cloned()
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| IngestError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| IngestError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    #[test]
    fn extracts_and_finds_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("meta.json.zip");
        {
            let file = fs::File::create(&zip_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = SimpleFileOptions::default();
            zip.start_file("__MACOSX/._meta.json", options).unwrap();
            zip.write_all(b"junk").unwrap();
            zip.start_file("labels/meta.json", options).unwrap();
            zip.write_all(br#"{"images": []}"#).unwrap();
            zip.finish().unwrap();
        }

        let out = dir.path().join("out");
        let written = extract_zip(&zip_path, &out).unwrap();
        assert_eq!(written.len(), 2);
        let picked = pick_metadata_json(&written).unwrap();
        assert!(picked.ends_with("labels/meta.json"));
        assert_eq!(find_metadata_json(&out).unwrap(), picked);
    }

    #[test]
    fn traversal_entries_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("evil.zip");
        {
            let file = fs::File::create(&zip_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("../escape.json", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"{}").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_zip(&zip_path, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, IngestError::Archive(_)));
        assert!(!dir.path().join("escape.json").exists());
    }

    #[test]
    fn empty_tree_has_no_metadata() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_metadata_json(dir.path()).is_err());
    }
}
