//! Text extraction from scanned documents.
//!
//! Non-PDF formats are one-shot reads. PDFs go through an ordered strategy
//! cascade: embedded vector text, the primary OCR engine over rendered pages,
//! an external re-processing tool, and a final fallback engine. Earlier
//! stages short-circuit later, more expensive ones, and every stage isolates
//! its own failures so one bad page or one missing engine never sinks the
//! whole document.

use std::path::Path;

use tempfile::TempDir;
use thiserror::Error;

use super::backend::{OcrBackend, OcrError};
use super::cache::TextCache;
use super::model_utils::check_binary;
use super::{ocrmypdf, office, poppler, spreadsheet};

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// No extraction strategy is usable on this host at all. The batch must
    /// stop: continuing would silently yield empty text for every file.
    #[error("no extraction strategy available: {0}")]
    NoStrategyAvailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// PDF-stage tuning, loaded from configuration.
#[derive(Debug, Clone)]
pub struct PdfSettings {
    /// Skip OCR entirely when the embedded text already looks complete.
    pub skip_ocr_if_vector_text: bool,
    /// Minimum character count for embedded text to count as complete.
    pub vector_text_min_chars: usize,
    /// Render resolution for OCR.
    pub dpi: u32,
    /// Longest allowed raster side; DPI is scaled down past this.
    pub max_render_side: u32,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            skip_ocr_if_vector_text: true,
            vector_text_min_chars: 64,
            dpi: 200,
            max_render_side: 4000,
        }
    }
}

/// Availability of one external tool or engine, for `ocr-check`.
pub struct ToolStatus {
    pub name: String,
    pub available: bool,
    pub hint: String,
}

/// Text extractor over all supported document formats.
pub struct TextExtractor {
    settings: PdfSettings,
    backends: Vec<Box<dyn OcrBackend>>,
    cache: Option<TextCache>,
}

impl TextExtractor {
    /// Build the extractor with the default engine order: PaddleOCR primary
    /// (when compiled in), Tesseract as the final fallback.
    pub fn new(settings: PdfSettings, ocr_config: super::backend::OcrConfig) -> Self {
        let mut backends: Vec<Box<dyn OcrBackend>> = Vec::new();
        #[cfg(feature = "ocr-paddle")]
        backends.push(Box::new(super::paddle_backend::PaddleBackend::with_config(
            ocr_config.clone(),
        )));
        backends.push(Box::new(super::tesseract::TesseractBackend::with_config(
            ocr_config,
        )));
        Self {
            settings,
            backends,
            cache: None,
        }
    }

    /// Attach a content cache; hits skip extraction entirely.
    pub fn with_cache(mut self, cache: TextCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Extract text from a file based on its extension. Unsupported
    /// extensions yield empty text.
    pub fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(path) {
                tracing::debug!("缓存命中: {}", path.display());
                return Ok(hit);
            }
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let text = match ext.as_str() {
            "docx" => office::read_docx_text(path)?,
            "pdf" => self.extract_pdf(path)?,
            "xlsx" | "xls" => spreadsheet::read_workbook_text(path)?,
            "csv" | "txt" => spreadsheet::read_plain_text(path)?,
            other => {
                tracing::debug!("跳过不支持的类型 {}: {}", other, path.display());
                String::new()
            }
        };

        if !text.trim().is_empty() {
            if let Some(cache) = &self.cache {
                cache.put(path, &text);
            }
        }
        Ok(text)
    }

    /// Run the PDF strategy cascade. `Ok` with empty text means every stage
    /// was exhausted without usable output; the caller records the failure.
    pub fn extract_pdf(&self, path: &Path) -> Result<String, ExtractionError> {
        self.ensure_any_strategy()?;

        // Stage 1: embedded vector text.
        let vector_result = poppler::run_pdftotext(path);
        let vector_unreadable = matches!(vector_result, Err(ExtractionError::ExtractionFailed(_)));
        let vector_text = match vector_result {
            Ok(text) => text,
            Err(ExtractionError::ToolNotFound(tool)) => {
                tracing::debug!("矢量文本阶段不可用: {}", tool);
                String::new()
            }
            Err(err) => {
                tracing::warn!("矢量文本提取失败 {}: {}", path.display(), err);
                String::new()
            }
        };
        if vector_text_is_adequate(&self.settings, &vector_text) {
            return Ok(vector_text);
        }

        // A document neither pdftotext nor pdfinfo can open fails fast; the
        // OCR stages could not render it either.
        if vector_unreadable && vector_text.trim().is_empty() {
            if let Err(err) = poppler::run_pdfinfo(path) {
                return Err(ExtractionError::ExtractionFailed(format!(
                    "无法打开文档: {err}"
                )));
            }
        }

        // Stage 2/3: primary engine over rendered pages (with per-page render
        // fallback). Vector and OCR text are complementary on hybrid
        // documents, so both are kept.
        let primary = self.primary_backend();
        let ocr_text = match primary {
            Some(backend) => self.ocr_stage(path, backend),
            None => String::new(),
        };
        let combined = concat_nonempty(&[&vector_text, &ocr_text]);
        if !combined.trim().is_empty() {
            return Ok(combined);
        }

        // Stage 4: rebuild the document with the external tool and retry the
        // cheaper stages against the result.
        if let Some(text) = self.reprocess_stage(path) {
            return Ok(text);
        }

        // Stage 5: last-resort OCR with a different engine than the primary.
        if let Some(backend) = self.fallback_backend() {
            let text = self.ocr_stage(path, backend);
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }

        tracing::warn!("全部提取策略失败: {}", path.display());
        Ok(String::new())
    }

    fn primary_backend(&self) -> Option<&dyn OcrBackend> {
        self.backends
            .iter()
            .find(|b| b.is_available())
            .map(|b| b.as_ref())
    }

    /// The next available engine after the primary.
    fn fallback_backend(&self) -> Option<&dyn OcrBackend> {
        let primary = self.primary_backend()?.backend_type();
        self.backends
            .iter()
            .filter(|b| b.is_available())
            .find(|b| b.backend_type() != primary)
            .map(|b| b.as_ref())
    }

    /// A batch with no viable strategy at all must stop early instead of
    /// producing misleadingly empty results for every file.
    fn ensure_any_strategy(&self) -> Result<(), ExtractionError> {
        let vector_ok = check_binary("pdftotext");
        let render_ok = check_binary("pdftoppm") && check_binary("pdfinfo");
        let ocr_ok = render_ok && self.backends.iter().any(|b| b.is_available());
        if vector_ok || ocr_ok || ocrmypdf::is_available() {
            return Ok(());
        }
        Err(ExtractionError::NoStrategyAvailable(
            "需要 poppler-utils（pdftotext/pdftoppm/pdfinfo）、tesseract 或 ocrmypdf 之一"
                .to_string(),
        ))
    }

    fn vector_stage(&self, path: &Path) -> String {
        match poppler::run_pdftotext(path) {
            Ok(text) => text,
            Err(ExtractionError::ToolNotFound(tool)) => {
                tracing::debug!("矢量文本阶段不可用: {}", tool);
                String::new()
            }
            Err(err) => {
                tracing::warn!("矢量文本提取失败 {}: {}", path.display(), err);
                String::new()
            }
        }
    }

    /// Render every page and run the given engine over the images. Page-level
    /// failures contribute a blank placeholder and the loop continues.
    fn ocr_stage(&self, path: &Path, backend: &dyn OcrBackend) -> String {
        let info = match poppler::run_pdfinfo(path) {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!("无法读取页面信息 {}: {}", path.display(), err);
                return String::new();
            }
        };
        let dpi =
            poppler::compute_render_dpi(&info, self.settings.dpi, self.settings.max_render_side);

        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => {
                tracing::warn!("临时目录创建失败: {}", err);
                return String::new();
            }
        };

        let mut pages: Vec<String> = Vec::with_capacity(info.pages as usize);
        for page in 1..=info.pages {
            let image = match poppler::render_page(path, page, dpi, temp_dir.path()) {
                Ok(Some(image)) => image,
                Ok(None) => {
                    // Blank placeholder: the page stays in sequence, empty.
                    pages.push(String::new());
                    continue;
                }
                Err(err) => {
                    tracing::warn!("渲染不可用，放弃 OCR 阶段: {}", err);
                    break;
                }
            };
            match backend.ocr_image(&image) {
                Ok(output) => pages.push(output.text),
                Err(OcrError::BackendNotAvailable(hint)) => {
                    tracing::warn!("{} 不可用: {}", backend.backend_type().name(), hint);
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        "{} 第 {} 页识别失败: {}",
                        backend.backend_type().name(),
                        page,
                        err
                    );
                    pages.push(String::new());
                }
            }
        }

        pages
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn reprocess_stage(&self, path: &Path) -> Option<String> {
        let work_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => {
                tracing::warn!("临时目录创建失败: {}", err);
                return None;
            }
        };
        let rebuilt = ocrmypdf::reprocess(path, &work_dir)?;

        let vector_text = self.vector_stage(&rebuilt);
        let ocr_text = match self.primary_backend() {
            Some(backend) => self.ocr_stage(&rebuilt, backend),
            None => String::new(),
        };
        let combined = concat_nonempty(&[&vector_text, &ocr_text]);
        if combined.trim().is_empty() {
            None
        } else {
            Some(combined)
        }
    }

    /// Availability report for every external tool and engine in the chain.
    pub fn check_tools(&self) -> Vec<ToolStatus> {
        let mut statuses: Vec<ToolStatus> = ["pdftotext", "pdftoppm", "pdfinfo", "ocrmypdf"]
            .iter()
            .map(|tool| ToolStatus {
                name: tool.to_string(),
                available: check_binary(tool),
                hint: format!("{} on PATH", tool),
            })
            .collect();
        for backend in &self.backends {
            statuses.push(ToolStatus {
                name: backend.backend_type().name().to_string(),
                available: backend.is_available(),
                hint: backend.availability_hint(),
            });
        }
        statuses
    }
}

/// Whether the embedded text alone satisfies the configured completeness
/// threshold, allowing the chain to return before any OCR stage runs.
fn vector_text_is_adequate(settings: &PdfSettings, text: &str) -> bool {
    settings.skip_ocr_if_vector_text
        && text.trim().chars().count() >= settings.vector_text_min_chars
}

fn concat_nonempty(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_skips_empty_parts() {
        assert_eq!(concat_nonempty(&["a", "", "  ", "b"]), "a\nb");
        assert_eq!(concat_nonempty(&["", "   "]), "");
    }

    #[test]
    fn test_adequate_vector_text_short_circuits_ocr() {
        let settings = PdfSettings {
            vector_text_min_chars: 5,
            ..Default::default()
        };
        assert!(vector_text_is_adequate(&settings, "第一页的完整文字"));
        assert!(!vector_text_is_adequate(&settings, "短"));
        // Whitespace does not count toward the threshold.
        assert!(!vector_text_is_adequate(&settings, "  \n\n  "));

        let no_skip = PdfSettings {
            skip_ocr_if_vector_text: false,
            vector_text_min_chars: 1,
            ..Default::default()
        };
        assert!(!vector_text_is_adequate(&no_skip, "足够长的嵌入文本"));
    }

    #[test]
    fn test_unsupported_extension_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        std::fs::write(&path, b"raw").unwrap();
        let extractor = TextExtractor::new(PdfSettings::default(), Default::default());
        assert_eq!(extractor.extract(&path).unwrap(), "");
    }

    #[test]
    fn test_txt_goes_through_plain_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("通知.txt");
        std::fs::write(&path, "张伟 202401001").unwrap();
        let extractor = TextExtractor::new(PdfSettings::default(), Default::default());
        assert_eq!(extractor.extract(&path).unwrap(), "张伟 202401001");
    }

    #[test]
    fn test_cache_hit_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "原始内容").unwrap();

        let cache = TextCache::new(dir.path().join("cache"));
        let extractor =
            TextExtractor::new(PdfSettings::default(), Default::default()).with_cache(cache);

        assert_eq!(extractor.extract(&path).unwrap(), "原始内容");
        // Unchanged identity → the second extraction is served from cache.
        assert_eq!(extractor.extract(&path).unwrap(), "原始内容");
    }
}
