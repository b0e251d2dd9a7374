//! Row sources: anything that yields [`RawRow`]s in increasing row order.

use encoding_rs::{CoderResult, Decoder, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use super::{detect_format, DetectedFormat, DETECTION_PREFIX_BYTES};
use crate::error::{CsvError, CsvResult};
use crate::models::RawRow;

const RAW_BUFFER_BYTES: usize = 8 * 1024;
const DECODED_BUFFER_BYTES: usize = 16 * 1024;

/// Producer of data rows.
///
/// Rows come out in increasing `row_number` order. `None` means the source
/// is exhausted; `Some(Err(_))` is an unrecoverable read failure.
pub trait RowSource {
    /// Column names, in file order.
    fn headers(&self) -> &[String];

    fn next_row(&mut self) -> Option<CsvResult<RawRow>>;
}

/// Inclusive, 1-based data row range handed to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRange {
    pub start_row: u64,
    pub end_row: u64,
}

impl RowRange {
    pub fn new(start_row: u64, end_row: u64) -> Self {
        Self { start_row, end_row }
    }

    pub fn len(&self) -> u64 {
        if self.end_row < self.start_row {
            0
        } else {
            self.end_row - self.start_row + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, row_number: u64) -> bool {
        row_number >= self.start_row && row_number <= self.end_row
    }
}

// =============================================================================
// Streaming decode
// =============================================================================

/// `Read` adapter that transcodes a legacy-encoded stream to UTF-8 on the fly.
pub struct DecodingReader<R> {
    inner: R,
    decoder: Decoder,
    raw: Vec<u8>,
    raw_start: usize,
    raw_end: usize,
    decoded: Vec<u8>,
    decoded_start: usize,
    decoded_end: usize,
    eof: bool,
    finished: bool,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder_with_bom_removal(),
            raw: vec![0; RAW_BUFFER_BYTES],
            raw_start: 0,
            raw_end: 0,
            decoded: vec![0; DECODED_BUFFER_BYTES],
            decoded_start: 0,
            decoded_end: 0,
            eof: false,
            finished: false,
        }
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.decoded_start < self.decoded_end {
                let available = &self.decoded[self.decoded_start..self.decoded_end];
                let n = available.len().min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                self.decoded_start += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            if self.raw_start == self.raw_end && !self.eof {
                let n = self.inner.read(&mut self.raw)?;
                self.raw_start = 0;
                self.raw_end = n;
                self.eof = n == 0;
            }

            let last = self.eof;
            let (result, read, written, _) = self.decoder.decode_to_utf8(
                &self.raw[self.raw_start..self.raw_end],
                &mut self.decoded,
                last,
            );
            self.raw_start += read;
            self.decoded_start = 0;
            self.decoded_end = written;
            if last && result == CoderResult::InputEmpty {
                self.finished = true;
            }
        }
    }
}

// =============================================================================
// CSV source
// =============================================================================

/// Streaming CSV row source over any byte reader.
pub struct CsvRowSource<R: Read> {
    reader: csv::Reader<DecodingReader<R>>,
    headers: Vec<String>,
    range: Option<RowRange>,
    next_row_number: u64,
    record: csv::StringRecord,
    done: bool,
}

impl CsvRowSource<File> {
    /// Open a file, detecting its encoding and delimiter from the first bytes.
    pub fn open(path: impl AsRef<Path>) -> CsvResult<(Self, DetectedFormat)> {
        let path = path.as_ref();
        let mut prefix = Vec::with_capacity(DETECTION_PREFIX_BYTES);
        File::open(path)?
            .take(DETECTION_PREFIX_BYTES as u64)
            .read_to_end(&mut prefix)?;
        if prefix.is_empty() {
            return Err(CsvError::EmptyFile);
        }
        let format = detect_format(&prefix);
        let source = Self::new(File::open(path)?, format)?;
        Ok((source, format))
    }
}

impl<'a> CsvRowSource<&'a [u8]> {
    /// Source over an in-memory buffer, detecting its format.
    pub fn from_bytes(bytes: &'a [u8]) -> CsvResult<(Self, DetectedFormat)> {
        if bytes.is_empty() {
            return Err(CsvError::EmptyFile);
        }
        let prefix = &bytes[..bytes.len().min(DETECTION_PREFIX_BYTES)];
        let format = detect_format(prefix);
        Ok((Self::new(bytes, format)?, format))
    }
}

impl<R: Read> CsvRowSource<R> {
    pub fn new(inner: R, format: DetectedFormat) -> CsvResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(format.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(DecodingReader::new(inner, format.encoding));

        let header_record = reader.headers()?.clone();
        if header_record.is_empty() {
            return Err(CsvError::EmptyFile);
        }
        if header_record.iter().all(|h| h.trim().is_empty()) {
            return Err(CsvError::NoHeaders);
        }

        Ok(Self {
            reader,
            headers: normalize_headers(header_record.iter()),
            range: None,
            next_row_number: 1,
            record: csv::StringRecord::new(),
            done: false,
        })
    }

    /// Restrict the source to a row range; rows before `start_row` are
    /// skipped without being materialized.
    pub fn with_range(mut self, range: RowRange) -> CsvResult<Self> {
        while self.next_row_number < range.start_row {
            if !self.read_data_record()? {
                self.done = true;
                break;
            }
            self.next_row_number += 1;
        }
        self.range = Some(range);
        Ok(self)
    }

    /// Read the next non-blank record into `self.record`.
    fn read_data_record(&mut self) -> CsvResult<bool> {
        loop {
            if !self.reader.read_record(&mut self.record)? {
                return Ok(false);
            }
            let blank = self.record.len() == 1 && self.record.get(0).is_some_and(|f| f.trim().is_empty());
            if !blank {
                return Ok(true);
            }
        }
    }

    fn build_row(&self, row_number: u64) -> RawRow {
        let mut fields = Map::new();
        for (i, header) in self.headers.iter().enumerate() {
            let raw = self.record.get(i).unwrap_or("");
            fields.insert(header.clone(), Value::String(raw.to_string()));
        }
        RawRow::new(row_number, fields)
    }
}

impl<R: Read> RowSource for CsvRowSource<R> {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_row(&mut self) -> Option<CsvResult<RawRow>> {
        if self.done {
            return None;
        }
        if let Some(range) = self.range {
            if self.next_row_number > range.end_row {
                self.done = true;
                return None;
            }
        }
        match self.read_data_record() {
            Ok(true) => {
                let row = self.build_row(self.next_row_number);
                self.next_row_number += 1;
                Some(Ok(row))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Trim header names, name blank ones `column_N` and suffix duplicates.
/// A suffix skips any name already taken, so every column keeps its own key.
fn normalize_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let raw: Vec<String> = raw
        .enumerate()
        .map(|(i, h)| match h.trim().trim_matches('"') {
            "" => format!("column_{}", i + 1),
            name => name.to_string(),
        })
        .collect();

    let mut taken: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut headers = Vec::with_capacity(raw.len());
    for base in raw {
        let mut name = base.clone();
        let mut suffix = 1;
        while taken.contains(&name) {
            suffix += 1;
            name = format!("{}_{}", base, suffix);
        }
        taken.insert(name.clone());
        headers.push(name);
    }
    headers
}

// =============================================================================
// In-memory source
// =============================================================================

/// Row source over rows already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRowSource {
    headers: Vec<String>,
    rows: VecDeque<RawRow>,
}

impl MemoryRowSource {
    pub fn new(headers: Vec<String>, rows: impl IntoIterator<Item = RawRow>) -> Self {
        Self {
            headers,
            rows: rows.into_iter().collect(),
        }
    }
}

impl RowSource for MemoryRowSource {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_row(&mut self) -> Option<CsvResult<RawRow>> {
        self.rows.pop_front().map(Ok)
    }
}
