use std::fs;
use std::io::Write;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Deserialize;

use camtrap_ingest::domain::SourceImage;
use camtrap_ingest::error::IngestError;
use camtrap_ingest::json_stream::stream_array;

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    id: u32,
}

#[test]
fn skips_unrelated_members_of_any_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    fs::write(
        &path,
        r#"{"info": {"deep": [[1, 2], {"s": "[{\"]"}], "n": null, "t": true},
            "licenses": [],
            "target": [{"id": 1}, {"id": 2, "extra": [NaN]}],
            "after": "ignored"}"#,
    )
    .unwrap();

    let mut stream = stream_array::<Item>(&path, "target").unwrap().unwrap();
    assert_eq!(stream.next().unwrap().unwrap(), Item { id: 1 });
    assert_eq!(stream.next().unwrap().unwrap(), Item { id: 2 });
    assert!(stream.next().is_none());
    assert_eq!(stream.position(), 2);
}

#[test]
fn each_key_opens_its_own_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json.gz");
    let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::fast());
    encoder
        .write_all(br#"{"annotations": [{"id": 9}], "images": [{"id": 5, "file_name": "a.jpg"}]}"#)
        .unwrap();
    encoder.finish().unwrap();

    let images = stream_array::<SourceImage>(&path, "images")
        .unwrap()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, "5");

    let annotations = stream_array::<Item>(&path, "annotations")
        .unwrap()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(annotations, vec![Item { id: 9 }]);
    assert!(stream_array::<Item>(&path, "categories").unwrap().is_none());
}

#[test]
fn bad_element_names_its_position() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    fs::write(&path, r#"{"target": [{"id": 1}, {"id": "x"}]}"#).unwrap();

    let results = stream_array::<Item>(&path, "target")
        .unwrap()
        .unwrap()
        .collect::<Vec<_>>();
    assert_eq!(results.len(), 2);
    assert_matches!(&results[1], Err(IngestError::MalformedJson(message)) if message.starts_with("target[1]"));
}

#[test]
fn missing_file_is_a_filesystem_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = stream_array::<Item>(&dir.path().join("absent.json"), "images");
    assert!(matches!(result, Err(IngestError::Filesystem(_))));
}
