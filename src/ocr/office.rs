//! DOCX text reader.
//!
//! A .docx file is a zip container; all visible body text (paragraphs and
//! table cells alike) lives in `word/document.xml` as `w:t` runs grouped
//! under `w:p` paragraphs.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::extractor::ExtractionError;

/// Extract plain text from a DOCX file, one line per paragraph.
pub fn read_docx_text(path: &Path) -> Result<String, ExtractionError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ExtractionError::ExtractionFailed(format!("not a docx container: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| {
            ExtractionError::ExtractionFailed(format!("word/document.xml missing: {}", e))
        })?
        .read_to_string(&mut xml)?;

    parse_document_xml(&xml)
}

fn parse_document_xml(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut lines: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = true,
                b"w:tab" => paragraph.push('\t'),
                b"w:br" => paragraph.push(' '),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => paragraph.push('\t'),
                b"w:br" => paragraph.push(' '),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => {
                    if !paragraph.trim().is_empty() {
                        lines.push(paragraph.trim_end().to_string());
                    }
                    paragraph.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if in_text_run {
                    let value = t.unescape().map_err(|e| {
                        ExtractionError::ExtractionFailed(format!("bad XML text run: {}", e))
                    })?;
                    paragraph.push_str(&value);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ExtractionError::ExtractionFailed(format!(
                    "document.xml parse error: {}",
                    e
                )))
            }
        }
    }

    if !paragraph.trim().is_empty() {
        lines.push(paragraph.trim_end().to_string());
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_and_table_cells() {
        let xml = r#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
              <w:body>
                <w:p><w:r><w:t>活动通知</w:t></w:r></w:p>
                <w:tbl><w:tr><w:tc>
                  <w:p><w:r><w:t>张伟</w:t></w:r><w:r><w:t> 202401001</w:t></w:r></w:p>
                </w:tc></w:tr></w:tbl>
              </w:body>
            </w:document>"#;
        let text = parse_document_xml(xml).unwrap();
        assert_eq!(text, "活动通知\n张伟 202401001");
    }

    #[test]
    fn test_empty_paragraphs_dropped() {
        let xml = r#"<w:document xmlns:w="x"><w:body>
            <w:p></w:p>
            <w:p><w:r><w:t>内容</w:t></w:r></w:p>
          </w:body></w:document>"#;
        let text = parse_document_xml(xml).unwrap();
        assert_eq!(text, "内容");
    }

    #[test]
    fn test_tab_and_break_runs() {
        let xml = r#"<w:document xmlns:w="x"><w:body>
            <w:p><w:r><w:t>姓名</w:t></w:r><w:tab/><w:r><w:t>学号</w:t></w:r></w:p>
          </w:body></w:document>"#;
        let text = parse_document_xml(xml).unwrap();
        assert_eq!(text, "姓名\t学号");
    }

    #[test]
    fn test_not_a_zip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.docx");
        std::fs::write(&path, b"plain bytes").unwrap();
        assert!(read_docx_text(&path).is_err());
    }
}
