//! Rewrites the bare `NaN` tokens that Python's `json.dump` emits into JSON `null`.
//!
//! A `NaN` is rewritten only in value position: the previous significant byte is
//! `:`, `,` or `[` and the next significant byte is `,`, `}` or `]`. Bytes whose
//! fate depends on input not yet read are held back and re-scanned together with
//! the next chunk, so a token split across reads is rewritten the same way as an
//! unsplit one.

use std::io::{self, Read};

const READ_CHUNK: usize = 64 * 1024;
const TOKEN: &[u8] = b"NaN";
const REPLACEMENT: &[u8] = b"null";

pub struct NanSanitizer<R> {
    inner: R,
    chunk: Vec<u8>,
    pending: Vec<u8>,
    output: Vec<u8>,
    output_pos: usize,
    last_significant: u8,
    in_string: bool,
    escaped: bool,
    replaced: u64,
    eof: bool,
}

impl<R: Read> NanSanitizer<R> {
    pub fn new(inner: R) -> Self {
        Self::with_chunk_size(inner, READ_CHUNK)
    }

    pub fn with_chunk_size(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            chunk: vec![0; chunk_size.max(1)],
            pending: Vec::new(),
            output: Vec::new(),
            output_pos: 0,
            last_significant: 0,
            in_string: false,
            escaped: false,
            replaced: 0,
            eof: false,
        }
    }

    /// Number of tokens rewritten so far.
    pub fn replaced(&self) -> u64 {
        self.replaced
    }

    fn fill_output(&mut self) -> io::Result<()> {
        while self.output_pos >= self.output.len() && !self.eof {
            self.output.clear();
            self.output_pos = 0;

            let read = loop {
                match self.inner.read(&mut self.chunk) {
                    Ok(n) => break n,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                }
            };
            if read == 0 {
                self.eof = true;
            } else {
                self.pending.extend_from_slice(&self.chunk[..read]);
            }

            let buffer = std::mem::take(&mut self.pending);
            let consumed = self.scan(&buffer);
            self.pending.extend_from_slice(&buffer[consumed..]);
        }
        Ok(())
    }

    /// Moves every decidable byte of `buffer` into `output` and returns how many
    /// bytes were consumed; the rest must be retried with more input.
    fn scan(&mut self, buffer: &[u8]) -> usize {
        let mut i = 0;
        while i < buffer.len() {
            let rest = &buffer[i..];
            if self.in_string {
                self.string_byte(rest[0]);
                i += 1;
                continue;
            }
            if rest[0] == b'N' {
                if rest.len() < TOKEN.len() && TOKEN.starts_with(rest) && !self.eof {
                    return i;
                }
                if rest.starts_with(TOKEN) && matches!(self.last_significant, b':' | b',' | b'[') {
                    match next_significant(&rest[TOKEN.len()..]) {
                        None if !self.eof => return i,
                        Some(b',' | b'}' | b']') => {
                            self.output.extend_from_slice(REPLACEMENT);
                            self.last_significant = b'l';
                            self.replaced += 1;
                            i += TOKEN.len();
                            continue;
                        }
                        _ => {}
                    }
                }
            }
            let byte = rest[0];
            if byte == b'"' {
                self.in_string = true;
            }
            if !byte.is_ascii_whitespace() {
                self.last_significant = byte;
            }
            self.output.push(byte);
            i += 1;
        }
        i
    }

    /// Copies one byte of a string literal, tracking escapes to find its end.
    fn string_byte(&mut self, byte: u8) {
        if self.escaped {
            self.escaped = false;
        } else if byte == b'\\' {
            self.escaped = true;
        } else if byte == b'"' {
            self.in_string = false;
            self.last_significant = byte;
        }
        self.output.push(byte);
    }
}

fn next_significant(bytes: &[u8]) -> Option<u8> {
    bytes.iter().copied().find(|byte| !byte.is_ascii_whitespace())
}

impl<R: Read> Read for NanSanitizer<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.fill_output()?;
        let available = &self.output[self.output_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.output_pos += n;
        Ok(n)
    }
}

/// Sanitizes a complete in-memory buffer.
pub fn sanitize_bytes(input: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    NanSanitizer::new(input).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str, chunk: usize) -> String {
        let mut out = String::new();
        NanSanitizer::with_chunk_size(input.as_bytes(), chunk)
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn rewrites_value_positions() {
        let input = r#"{"a": NaN, "b": [NaN,1,NaN], "c": NaN}"#;
        assert_eq!(run(input, 4096), r#"{"a": null, "b": [null,1,null], "c": null}"#);
    }

    #[test]
    fn leaves_strings_and_identifiers_alone() {
        let input = r#"{"NaN": "NaN", "x": "a NaN,b", "NaNa": 1}"#;
        assert_eq!(run(input, 4096), input);
    }

    #[test]
    fn trailing_nan_without_delimiter_is_kept() {
        assert_eq!(run("[1, NaN", 2), "[1, NaN");
    }

    #[test]
    fn every_chunk_size_gives_the_same_output() {
        let input = r#"{"score": NaN, "box": [ NaN ,  NaN ], "conf":NaN}"#;
        let expected = r#"{"score": null, "box": [ null ,  null ], "conf":null}"#;
        for chunk in 1..input.len() + 2 {
            assert_eq!(run(input, chunk), expected, "chunk size {chunk}");
        }
    }

    #[test]
    fn nan_between_commas_inside_a_string_survives_every_chunk_size() {
        let input = r#"{"note": "a,NaN,b", "esc": "q\",NaN]", "x": [NaN]}"#;
        let expected = r#"{"note": "a,NaN,b", "esc": "q\",NaN]", "x": [null]}"#;
        for chunk in 1..input.len() + 2 {
            assert_eq!(run(input, chunk), expected, "chunk size {chunk}");
        }
    }
}
