//! OCR backend abstraction.
//!
//! Each recognition engine implements [`OcrBackend`]; the extraction chain
//! holds them as trait objects and tries them in its configured order. A
//! backend that is unavailable on the host (missing binary, missing models)
//! reports so instead of erroring mid-document.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur inside an OCR backend.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which engine produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackendType {
    /// PaddleOCR via ONNX Runtime (primary engine).
    PaddleOcr,
    /// Tesseract CLI (final fallback).
    Tesseract,
}

impl OcrBackendType {
    pub fn name(&self) -> &'static str {
        match self {
            OcrBackendType::PaddleOcr => "paddleocr",
            OcrBackendType::Tesseract => "tesseract",
        }
    }
}

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Recognition language (Tesseract language string).
    pub language: String,
    /// Explicit model directory override.
    pub model_path: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "chi_sim+eng".to_string(),
            model_path: None,
        }
    }
}

/// Text recognized from one image.
#[derive(Debug)]
pub struct OcrOutput {
    pub text: String,
    pub backend: OcrBackendType,
    pub processing_time_ms: u64,
}

/// A recognition engine the extraction chain can try.
pub trait OcrBackend: Send + Sync {
    fn backend_type(&self) -> OcrBackendType;

    /// Whether the engine can run on this host right now.
    fn is_available(&self) -> bool;

    /// Human-readable install/availability hint.
    fn availability_hint(&self) -> String;

    /// Recognize text in a single rendered page image.
    fn ocr_image(&self, image_path: &Path) -> Result<OcrOutput, OcrError>;
}
