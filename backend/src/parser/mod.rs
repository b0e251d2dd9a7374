//! Format detection and streaming CSV row sources.
//!
//! Detection only ever looks at a short prefix of the file and never fails:
//! the worst case is a wrong guess, which surfaces later as garbled values.

pub mod source;

pub use source::{CsvRowSource, DecodingReader, MemoryRowSource, RowRange, RowSource};

use encoding_rs::{Encoding, BIG5, GBK, UTF_8};
use serde::Serialize;

/// Bytes of the file inspected by [`detect_format`].
pub const DETECTION_PREFIX_BYTES: usize = 4096;

/// Lines inspected by [`detect_delimiter`].
const DELIMITER_SAMPLE_LINES: usize = 5;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Legacy multi-byte encodings tried after UTF-8, in order.
fn legacy_encodings() -> [&'static Encoding; 2] {
    [GBK, BIG5]
}

/// Detected byte encoding and field delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedFormat {
    pub encoding: &'static Encoding,
    pub delimiter: u8,
    pub has_bom: bool,
}

impl DetectedFormat {
    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn delimiter_char(&self) -> char {
        self.delimiter as char
    }
}

impl Default for DetectedFormat {
    fn default() -> Self {
        Self {
            encoding: UTF_8,
            delimiter: b',',
            has_bom: false,
        }
    }
}

impl Serialize for DetectedFormat {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("DetectedFormat", 3)?;
        s.serialize_field("encoding", self.encoding_name())?;
        s.serialize_field("delimiter", format_delimiter(self.delimiter_char()))?;
        s.serialize_field("hasBom", &self.has_bom)?;
        s.end()
    }
}

/// Detect encoding and delimiter from the start of a file.
pub fn detect_format(prefix: &[u8]) -> DetectedFormat {
    let has_bom = prefix.starts_with(UTF8_BOM);
    let encoding = detect_encoding(prefix);
    let body = if has_bom { &prefix[UTF8_BOM.len()..] } else { prefix };
    let (text, _) = encoding.decode_without_bom_handling(body);
    DetectedFormat {
        encoding,
        delimiter: detect_delimiter(&text),
        has_bom,
    }
}

/// Detect the encoding of a file prefix.
///
/// A UTF-8 BOM wins outright. Otherwise valid UTF-8 is accepted, then each
/// legacy Chinese encoding that decodes cleanly *and* yields CJK text.
/// Anything else falls back to UTF-8.
pub fn detect_encoding(prefix: &[u8]) -> &'static Encoding {
    if prefix.starts_with(UTF8_BOM) {
        return UTF_8;
    }
    if is_utf8_prefix(prefix) {
        return UTF_8;
    }
    for encoding in legacy_encodings() {
        if let Some(text) = decode_prefix_strict(encoding, prefix) {
            if contains_cjk(&text) {
                return encoding;
            }
        }
    }
    UTF_8
}

/// UTF-8 validity check that tolerates a character cut at the prefix end.
fn is_utf8_prefix(bytes: &[u8]) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// Decode without replacement characters; a multi-byte character cut by the
/// prefix boundary is dropped rather than counted as an error.
fn decode_prefix_strict(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    let mut end = bytes.len();
    let floor = end.saturating_sub(1);
    loop {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(&bytes[..end]) {
            return Some(text.into_owned());
        }
        if end == floor || end == 0 {
            return None;
        }
        end -= 1;
    }
}

fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c,
            '\u{4E00}'..='\u{9FFF}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{3000}'..='\u{303F}'
            | '\u{FF00}'..='\u{FFEF}')
    })
}

/// Pick the delimiter with the most occurrences over the first lines.
/// Ties and a zero count fall back to comma.
pub fn detect_delimiter(content: &str) -> u8 {
    let candidates = [b',', b';', b'\t'];
    let mut counts = [0usize; 3];
    for line in content.lines().take(DELIMITER_SAMPLE_LINES) {
        for (count, &sep) in counts.iter_mut().zip(candidates.iter()) {
            *count += line.bytes().filter(|&b| b == sep).count();
        }
    }

    let best = counts.iter().copied().max().unwrap_or(0);
    if best == 0 {
        return b',';
    }
    let winners: Vec<u8> = candidates
        .iter()
        .zip(counts.iter())
        .filter(|(_, &c)| c == best)
        .map(|(&sep, _)| sep)
        .collect();
    match winners.as_slice() {
        [only] => *only,
        _ => b',',
    }
}

/// Decode a whole buffer with a detected encoding (BOM removed).
pub fn decode_content(bytes: &[u8], encoding: &'static Encoding) -> String {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    encoding.decode_without_bom_handling(body).0.into_owned()
}

/// Coarse row-count estimate used before any row has been read.
pub fn estimate_total_rows(file_size: u64, avg_row_bytes: u64, buffer_factor: f64) -> u64 {
    if file_size == 0 {
        return 0;
    }
    let avg = avg_row_bytes.max(1) as f64;
    let estimate = (file_size as f64 / avg * buffer_factor.max(1.0)).ceil() as u64;
    estimate.max(1)
}

/// Format delimiter for display.
pub fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter_semicolon() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), b';');
    }

    #[test]
    fn test_detect_delimiter_comma() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
    }

    #[test]
    fn test_detect_delimiter_tab() {
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), b'\t');
    }

    #[test]
    fn test_detect_delimiter_tie_and_zero_default_to_comma() {
        assert_eq!(detect_delimiter("a;b\tc"), b',');
        assert_eq!(detect_delimiter("single column\nvalue"), b',');
    }

    #[test]
    fn test_detect_delimiter_only_first_five_lines() {
        let content = "a,b\n1,2\n3,4\n5,6\n7,8\n;;;;;;;;;;;;;\n;;;;;;;;;;;;;";
        assert_eq!(detect_delimiter(content), b',');
    }

    #[test]
    fn test_bom_forces_utf8() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("姓名;电话\n张三;13812345678".as_bytes());
        let format = detect_format(&bytes);
        assert_eq!(format.encoding, UTF_8);
        assert!(format.has_bom);
        assert_eq!(format.delimiter, b';');
    }

    #[test]
    fn test_detect_gbk() {
        let (bytes, _, _) = GBK.encode("姓名,手机号码,地址\n张三,13812345678,北京市朝阳区");
        assert_eq!(detect_encoding(&bytes), GBK);
        let format = detect_format(&bytes);
        assert_eq!(format.delimiter, b',');
        assert!(decode_content(&bytes, format.encoding).contains("张三"));
    }

    #[test]
    fn test_detect_utf8_with_cut_character() {
        let text = "姓名,地址\n张三,北京".as_bytes();
        let cut = &text[..text.len() - 1];
        assert_eq!(detect_encoding(cut), UTF_8);
    }

    #[test]
    fn test_garbage_defaults_to_utf8() {
        let bytes = [0xFFu8, 0xFE, 0xFF, 0x80, 0x81];
        assert_eq!(detect_encoding(&bytes), UTF_8);
    }

    #[test]
    fn test_estimate_total_rows() {
        assert_eq!(estimate_total_rows(0, 100, 1.1), 0);
        assert_eq!(estimate_total_rows(1000, 100, 1.0), 10);
        assert_eq!(estimate_total_rows(1000, 100, 1.1), 11);
        assert_eq!(estimate_total_rows(10, 100, 1.1), 1);
    }
}
