//! Spreadsheet (Excel/CSV) and plain-text readers.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use super::extractor::ExtractionError;

/// Decode raw bytes using the encodings these documents show up in:
/// UTF-8 (optionally with BOM), then GBK, then lossy UTF-8 as a last resort.
pub fn decode_text_bytes(bytes: &[u8]) -> String {
    let bytes = bytes
        .strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    let (decoded, _, had_errors) = encoding_rs::GBK.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn range_to_text(range: &Range<Data>) -> String {
    range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\t")
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Return a textual rendering of a workbook: every sheet as tab-separated
/// rows, sheets separated by a blank line.
pub fn read_workbook_text(path: &Path) -> Result<String, ExtractionError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ExtractionError::ExtractionFailed(format!("open workbook failed: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_owned();
    let mut segments: Vec<String> = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        match workbook.worksheet_range(&name) {
            Ok(range) => {
                let text = range_to_text(&range);
                if !text.is_empty() {
                    segments.push(text);
                }
            }
            Err(e) => {
                tracing::warn!("工作表 {} 读取失败: {}", name, e);
            }
        }
    }
    Ok(segments.join("\n\n"))
}

/// CSV and plain-text files are scanned as-is after decoding.
pub fn read_plain_text(path: &Path) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path)?;
    Ok(decode_text_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_with_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("姓名,学号".as_bytes());
        assert_eq!(decode_text_bytes(&bytes), "姓名,学号");
    }

    #[test]
    fn test_decode_gbk() {
        // "张伟" in GBK
        let bytes = [0xD5u8, 0xC5, 0xCE, 0xB0];
        assert_eq!(decode_text_bytes(&bytes), "张伟");
    }

    #[test]
    fn test_decode_plain_ascii() {
        assert_eq!(decode_text_bytes(b"202401001"), "202401001");
    }

    #[test]
    fn test_read_plain_text_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "姓名,学号\n张伟,202401001\n").unwrap();
        let text = read_plain_text(&path).unwrap();
        assert!(text.contains("张伟"));
        assert!(text.contains("202401001"));
    }
}
