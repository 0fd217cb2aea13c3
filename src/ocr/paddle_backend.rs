//! PaddleOCR backend implementation.
//!
//! Uses paddle-ocr-rs for OCR via ONNX Runtime. This is the primary
//! recognition engine for scanned class-activity documents (the roster is
//! Chinese, and the PP-OCR models handle mixed Chinese/Latin lines well).
//!
//! Models are automatically downloaded on first use from:
//! https://github.com/RapidAI/RapidOCR

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Instant;

use paddle_ocr_rs::ocr_lite::OcrLite;

use super::backend::{OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrOutput};
use super::model_utils::{ensure_model_file, ModelDirConfig, ModelSpec};

thread_local! {
    // Each extraction worker thread keeps its own engine; OcrLite sessions
    // are not shared across workers.
    static OCR_ENGINE: RefCell<Option<OcrLite>> = const { RefCell::new(None) };
}

/// Model directory configuration for PaddleOCR.
const MODEL_CONFIG: ModelDirConfig = ModelDirConfig {
    subdir: "rollscan/paddle-ocr",
    required_files: &[DET_MODEL_NAME, REC_MODEL_NAME],
};

const DET_MODEL_NAME: &str = "ch_PP-OCRv4_det_infer.onnx";
const REC_MODEL_NAME: &str = "ch_PP-OCRv4_rec_infer.onnx";
const CLS_MODEL_NAME: &str = "ch_ppocr_mobile_v2.0_cls_infer.onnx";

const DET_MODEL: ModelSpec = ModelSpec {
    url: "https://huggingface.co/SWHL/RapidOCR/resolve/main/PP-OCRv4/ch_PP-OCRv4_det_infer.onnx",
    filename: DET_MODEL_NAME,
    size_hint: "4 MB",
};

const REC_MODEL: ModelSpec = ModelSpec {
    url: "https://huggingface.co/SWHL/RapidOCR/resolve/main/PP-OCRv4/ch_PP-OCRv4_rec_infer.onnx",
    filename: REC_MODEL_NAME,
    size_hint: "10 MB",
};

const CLS_MODEL: ModelSpec = ModelSpec {
    url: "https://www.modelscope.cn/models/RapidAI/RapidOCR/resolve/v3.4.0/onnx/PP-OCRv4/cls/ch_ppocr_mobile_v2.0_cls_infer.onnx",
    filename: CLS_MODEL_NAME,
    size_hint: "1 MB",
};

/// Longest image side handed to the detector.
const DETECT_MAX_SIDE: u32 = 1024;

/// PaddleOCR backend via ONNX Runtime.
pub struct PaddleBackend {
    config: OcrConfig,
}

impl PaddleBackend {
    pub fn new() -> Self {
        Self {
            config: OcrConfig::default(),
        }
    }

    pub fn with_config(config: OcrConfig) -> Self {
        Self { config }
    }

    /// Find the model directory, checking the config path then standard
    /// locations.
    fn find_model_dir(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.config.model_path {
            if MODEL_CONFIG.has_required_files(path) {
                return Some(path.clone());
            }
        }
        MODEL_CONFIG
            .candidate_dirs()
            .into_iter()
            .find(|candidate| MODEL_CONFIG.has_required_files(candidate))
    }

    /// Ensure models are present, downloading them if necessary.
    fn ensure_models(&self) -> Result<PathBuf, OcrError> {
        if let Some(dir) = self.find_model_dir() {
            return Ok(dir);
        }

        let model_dir = MODEL_CONFIG.default_dir();
        std::fs::create_dir_all(&model_dir).map_err(OcrError::Io)?;

        ensure_model_file(&DET_MODEL, &model_dir)?;
        ensure_model_file(&REC_MODEL, &model_dir)?;
        ensure_model_file(&CLS_MODEL, &model_dir)?;

        Ok(model_dir)
    }

    fn init_engine(&self) -> Result<OcrLite, OcrError> {
        let model_dir = self.ensure_models()?;
        let det = model_dir.join(DET_MODEL_NAME);
        let rec = model_dir.join(REC_MODEL_NAME);
        let cls = model_dir.join(CLS_MODEL_NAME);

        let mut ocr = OcrLite::new();
        let num_threads = 4;
        ocr.init_models(
            &det.to_string_lossy(),
            &cls.to_string_lossy(),
            &rec.to_string_lossy(),
            num_threads,
        )
        .map_err(|e| OcrError::OcrFailed(format!("Failed to init PaddleOCR: {}", e)))?;
        Ok(ocr)
    }

    /// Shrink oversized renders in place before detection. ONNX inference
    /// time grows sharply with raster size, and the detector resizes
    /// internally anyway.
    fn downscale_if_oversized(&self, image_path: &Path) -> Result<(), OcrError> {
        let img = image::open(image_path)
            .map_err(|e| OcrError::OcrFailed(format!("Failed to read render: {}", e)))?;
        let (w, h) = (img.width(), img.height());
        let longest = w.max(h);
        if longest <= DETECT_MAX_SIDE * 4 {
            return Ok(());
        }
        let scale = f64::from(DETECT_MAX_SIDE * 4) / f64::from(longest);
        let nw = (f64::from(w) * scale) as u32;
        let nh = (f64::from(h) * scale) as u32;
        let resized = img.resize(nw.max(1), nh.max(1), image::imageops::FilterType::Triangle);
        resized
            .save(image_path)
            .map_err(|e| OcrError::OcrFailed(format!("Failed to rewrite render: {}", e)))?;
        Ok(())
    }

    /// Run OCR on an image path using this thread's engine.
    fn run_paddle(&self, image_path: &Path) -> Result<String, OcrError> {
        self.downscale_if_oversized(image_path)?;

        OCR_ENGINE.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                *slot = Some(self.init_engine()?);
            }
            let ocr = slot.as_mut().ok_or_else(|| {
                OcrError::OcrFailed("OCR engine initialization lost".to_string())
            })?;

            let result = ocr
                .detect_from_path(
                    image_path.to_str().unwrap_or(""),
                    50,    // padding
                    1024,  // max side length
                    0.5,   // box score threshold
                    0.3,   // unclip ratio
                    1.6,   // box threshold
                    false, // do angle
                    false, // most angle
                )
                .map_err(|e| OcrError::OcrFailed(format!("PaddleOCR detection failed: {}", e)))?;

            let texts: Vec<String> = result
                .text_blocks
                .iter()
                .map(|block| block.text.clone())
                .collect();
            Ok(texts.join("\n"))
        })
    }
}

impl Default for PaddleBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBackend for PaddleBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::PaddleOcr
    }

    fn is_available(&self) -> bool {
        // Models auto-download on first use; only an explicit bogus model
        // path makes the backend unavailable up front.
        true
    }

    fn availability_hint(&self) -> String {
        match self.find_model_dir() {
            Some(path) => format!("PaddleOCR models found at {:?}", path),
            None => format!(
                "PaddleOCR models will be auto-downloaded on first use (~15 MB total) to {:?}",
                MODEL_CONFIG.default_dir()
            ),
        }
    }

    fn ocr_image(&self, image_path: &Path) -> Result<OcrOutput, OcrError> {
        let start = Instant::now();
        let text = self.run_paddle(image_path)?;
        Ok(OcrOutput {
            text,
            backend: OcrBackendType::PaddleOcr,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}
