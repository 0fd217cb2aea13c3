//! OCR and text extraction module.
//!
//! Extracts text from documents using:
//! - pdftotext (Poppler) for embedded PDF text
//! - PaddleOCR via ONNX for rendered pages (feature: ocr-paddle, default)
//! - ocrmypdf as an external re-processing fallback
//! - Tesseract OCR as the final fallback engine
//! - zip + quick-xml for DOCX, calamine for spreadsheets
//!
//! The PDF stages run as an ordered cascade; see [`extractor::TextExtractor`].

mod backend;
mod cache;
mod extractor;
mod model_utils;
mod ocrmypdf;
mod office;
mod poppler;
mod spreadsheet;
mod tesseract;

#[cfg(feature = "ocr-paddle")]
mod paddle_backend;

pub use backend::{OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrOutput};
pub use cache::TextCache;
pub use extractor::{ExtractionError, PdfSettings, TextExtractor, ToolStatus};
pub use model_utils::check_binary;
pub use spreadsheet::decode_text_bytes;
pub use tesseract::TesseractBackend;

#[cfg(feature = "ocr-paddle")]
pub use paddle_backend::PaddleBackend;
