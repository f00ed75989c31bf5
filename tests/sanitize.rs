use std::io::{self, Read};

use camtrap_ingest::sanitize::{NanSanitizer, sanitize_bytes};

/// Hands out its input in fixed pieces so tokens straddle read boundaries.
struct Pieces {
    parts: Vec<Vec<u8>>,
}

impl Pieces {
    fn new(parts: &[&str]) -> Self {
        Self {
            parts: parts.iter().rev().map(|part| part.as_bytes().to_vec()).collect(),
        }
    }
}

impl Read for Pieces {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut part) = self.parts.pop() else {
            return Ok(0);
        };
        let n = part.len().min(buf.len());
        buf[..n].copy_from_slice(&part[..n]);
        if n < part.len() {
            self.parts.push(part.split_off(n));
        }
        Ok(n)
    }
}

fn sanitize_pieces(parts: &[&str]) -> (String, u64) {
    let mut reader = NanSanitizer::new(Pieces::new(parts));
    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    (out, reader.replaced())
}

#[test]
fn token_split_across_reads_is_rewritten() {
    let (out, replaced) = sanitize_pieces(&[r#"{"w": Na"#, r#"N, "h": [1, N"#, "aN]}"]);
    assert_eq!(out, r#"{"w": null, "h": [1, null]}"#);
    assert_eq!(replaced, 2);
    serde_json::from_str::<serde_json::Value>(&out).unwrap();
}

#[test]
fn lookahead_waits_for_the_next_significant_byte() {
    let (out, _) = sanitize_pieces(&[r#"{"a": NaN"#, "   ", "\n}"]);
    assert_eq!(out, "{\"a\": null   \n}");
}

#[test]
fn text_inside_strings_is_untouched() {
    let input = br#"{"name": "NaN", "note": "x NaN y"}"#;
    assert_eq!(sanitize_bytes(input).unwrap(), input.to_vec());
}

#[test]
fn identifiers_starting_with_nan_are_untouched() {
    let input = br#"[NaNa, NaN]"#;
    assert_eq!(sanitize_bytes(input).unwrap(), br#"[NaNa, null]"#.to_vec());
}

#[test]
fn small_internal_chunks_give_the_same_output() {
    let input = r#"{"images": [{"width": NaN}, {"width": 3}], "x": [NaN,NaN]}"#;
    let expected = sanitize_bytes(input.as_bytes()).unwrap();
    for chunk in 1..8 {
        let mut out = Vec::new();
        NanSanitizer::with_chunk_size(input.as_bytes(), chunk)
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, expected, "chunk size {chunk}");
    }
}
