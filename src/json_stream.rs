//! Pulls the elements of one top-level array out of a JSON document without
//! materializing the rest of it.
//!
//! Sibling values are walked byte by byte and discarded; each element of the
//! selected array is buffered on its own and handed to serde. Memory therefore
//! scales with the largest single element, not with the document.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;

use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;

use crate::error::IngestError;
use crate::sanitize::NanSanitizer;

pub type SourceReader = BufReader<NanSanitizer<Box<dyn Read>>>;

/// Opens a COCO metadata file (optionally gzip-compressed) behind the NaN sanitizer.
pub fn open_source(path: &Path) -> Result<SourceReader, IngestError> {
    let file = File::open(path)
        .map_err(|err| IngestError::Filesystem(format!("open {}: {err}", path.display())))?;
    let raw: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(file)
    };
    Ok(BufReader::new(NanSanitizer::new(raw)))
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Opens `path` and positions a stream on the top-level array named `key`.
/// Returns `Ok(None)` when the document has no such key.
pub fn stream_array<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<ArrayStream<SourceReader, T>>, IngestError> {
    ArrayStream::open(open_source(path)?, key)
}

enum State {
    Elements { first: bool },
    Done,
}

pub struct ArrayStream<R, T> {
    scanner: Scanner<R>,
    key: String,
    state: State,
    element: Vec<u8>,
    index: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<R: BufRead, T: DeserializeOwned> ArrayStream<R, T> {
    pub fn open(reader: R, key: &str) -> Result<Option<Self>, IngestError> {
        let mut scanner = Scanner::new(reader);
        scanner.skip_whitespace()?;
        scanner.expect(b'{')?;
        scanner.skip_whitespace()?;
        if scanner.peek()? == Some(b'}') {
            return Ok(None);
        }

        let mut raw_key = Vec::new();
        loop {
            raw_key.clear();
            scanner.skip_whitespace()?;
            scanner.walk_value(Some(&mut raw_key))?;
            let name: String = serde_json::from_slice(&raw_key)
                .map_err(|err| scanner.malformed(&format!("object key: {err}")))?;
            scanner.skip_whitespace()?;
            scanner.expect(b':')?;
            scanner.skip_whitespace()?;

            if name == key {
                if scanner.peek()? != Some(b'[') {
                    return Err(IngestError::NotAnArray(key.to_string()));
                }
                scanner.bump()?;
                return Ok(Some(Self {
                    scanner,
                    key: key.to_string(),
                    state: State::Elements { first: true },
                    element: Vec::new(),
                    index: 0,
                    _marker: PhantomData,
                }));
            }

            scanner.walk_value(None)?;
            scanner.skip_whitespace()?;
            match scanner.bump()? {
                Some(b',') => continue,
                Some(b'}') => return Ok(None),
                _ => return Err(scanner.malformed("expected `,` or `}` after object member")),
            }
        }
    }

    /// Elements yielded so far.
    pub fn position(&self) -> u64 {
        self.index
    }

    fn next_element(&mut self, first: bool) -> Result<Option<T>, IngestError> {
        self.scanner.skip_whitespace()?;
        match self.scanner.peek()? {
            Some(b']') => {
                self.scanner.bump()?;
                return Ok(None);
            }
            None => return Err(self.scanner.malformed("unterminated array")),
            Some(b',') if !first => {
                self.scanner.bump()?;
                self.scanner.skip_whitespace()?;
            }
            Some(_) if !first => {
                return Err(self.scanner.malformed("expected `,` or `]` in array"));
            }
            Some(_) => {}
        }

        self.element.clear();
        self.scanner.walk_value(Some(&mut self.element))?;
        let value = serde_json::from_slice(&self.element).map_err(|err| {
            IngestError::MalformedJson(format!("{}[{}]: {err}", self.key, self.index))
        })?;
        self.index += 1;
        Ok(Some(value))
    }
}

impl<R: BufRead, T: DeserializeOwned> Iterator for ArrayStream<R, T> {
    type Item = Result<T, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.state {
            State::Done => return None,
            State::Elements { first } => first,
        };
        match self.next_element(first) {
            Ok(Some(value)) => {
                self.state = State::Elements { first: false };
                Some(Ok(value))
            }
            Ok(None) => {
                self.state = State::Done;
                None
            }
            Err(err) => {
                self.state = State::Done;
                Some(Err(err))
            }
        }
    }
}

struct Scanner<R> {
    reader: R,
    offset: u64,
}

impl<R: BufRead> Scanner<R> {
    fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    fn malformed(&self, message: &str) -> IngestError {
        IngestError::MalformedJson(format!("{message} at byte {}", self.offset))
    }

    fn peek(&mut self) -> Result<Option<u8>, IngestError> {
        let buf = self
            .reader
            .fill_buf()
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        Ok(buf.first().copied())
    }

    fn bump(&mut self) -> Result<Option<u8>, IngestError> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.reader.consume(1);
            self.offset += 1;
        }
        Ok(byte)
    }

    fn expect(&mut self, wanted: u8) -> Result<(), IngestError> {
        match self.bump()? {
            Some(byte) if byte == wanted => Ok(()),
            Some(byte) => Err(self.malformed(&format!(
                "expected `{}`, found `{}`",
                wanted as char, byte as char
            ))),
            None => Err(self.malformed(&format!(
                "expected `{}`, found end of input",
                wanted as char
            ))),
        }
    }

    fn skip_whitespace(&mut self) -> Result<(), IngestError> {
        loop {
            let buf = self
                .reader
                .fill_buf()
                .map_err(|err| IngestError::Filesystem(err.to_string()))?;
            if buf.is_empty() {
                return Ok(());
            }
            let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            let exhausted = skip == buf.len();
            self.reader.consume(skip);
            self.offset += skip as u64;
            if !exhausted {
                return Ok(());
            }
        }
    }

    /// Consumes one JSON value, copying its bytes into `keep` when given.
    /// Structure is only tracked far enough to find the value's end; serde
    /// validates whatever is kept.
    fn walk_value(&mut self, mut keep: Option<&mut Vec<u8>>) -> Result<(), IngestError> {
        let first = match self.peek()? {
            Some(byte) => byte,
            None => return Err(self.malformed("expected a value, found end of input")),
        };

        match first {
            b'"' => self.walk_string(&mut keep),
            b'{' | b'[' => {
                let mut depth = 0usize;
                loop {
                    let byte = match self.bump()? {
                        Some(byte) => byte,
                        None => return Err(self.malformed("unterminated container")),
                    };
                    match byte {
                        b'"' => {
                            self.walk_string_body(&mut keep)?;
                            continue;
                        }
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => depth -= 1,
                        _ => {}
                    }
                    if let Some(out) = keep.as_deref_mut() {
                        out.push(byte);
                    }
                    if depth == 0 {
                        return Ok(());
                    }
                }
            }
            b',' | b'}' | b']' | b':' => Err(self.malformed(&format!(
                "unexpected `{}` where a value was expected",
                first as char
            ))),
            _ => {
                let mut len = 0usize;
                while let Some(byte) = self.peek()? {
                    if matches!(byte, b',' | b'}' | b']') || byte.is_ascii_whitespace() {
                        break;
                    }
                    self.bump()?;
                    if let Some(out) = keep.as_deref_mut() {
                        out.push(byte);
                    }
                    len += 1;
                }
                if len == 0 {
                    return Err(self.malformed("empty scalar"));
                }
                Ok(())
            }
        }
    }

    fn walk_string(&mut self, keep: &mut Option<&mut Vec<u8>>) -> Result<(), IngestError> {
        self.expect(b'"')?;
        self.walk_string_body(keep)
    }

    /// Walks a string whose opening quote has already been consumed.
    fn walk_string_body(&mut self, keep: &mut Option<&mut Vec<u8>>) -> Result<(), IngestError> {
        if let Some(out) = keep.as_deref_mut() {
            out.push(b'"');
        }
        let mut escaped = false;
        loop {
            let byte = match self.bump()? {
                Some(byte) => byte,
                None => return Err(self.malformed("unterminated string")),
            };
            if let Some(out) = keep.as_deref_mut() {
                out.push(byte);
            }
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                return Ok(());
            }
        }
    }
}
