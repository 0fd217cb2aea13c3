//! Configuration management for rollscan.
//!
//! Runtime settings come from `rollscan.yml` in the working directory; a
//! missing file means full defaults, so the tool runs with zero setup. The
//! student roster is a separate JSON file so it can be regenerated from the
//! enrollment system without touching the config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::ocr::{decode_text_bytes, OcrConfig, PdfSettings};

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILE: &str = "rollscan.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

/// All runtime settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Keywords that mark a document's first line as an activity title.
    pub default_activity_keywords: Vec<String>,
    /// Class-tag keywords searched independently of the roster.
    pub default_class_keywords: Vec<String>,

    /// Skip OCR when the embedded text already looks complete.
    pub ocr_skip_if_vector_text: bool,
    /// Minimum character count for embedded text to count as complete.
    pub ocr_vector_text_min_chars: usize,
    /// Render resolution for OCR.
    pub ocr_dpi: u32,
    /// Longest allowed raster side in pixels.
    pub ocr_max_side: u32,
    /// Recognition language (Tesseract language string).
    pub ocr_lang: String,

    /// Fixed worker count; 0 means calibrate automatically.
    pub workers: usize,
    /// Per-file extraction timeout in seconds; 0 disables the timeout.
    pub timeout_sec: f64,

    /// Default scan roots when the CLI gives none.
    pub scan_paths: Vec<String>,
    /// Student roster JSON ({"students": {"name": "id"}}).
    pub student_roster_path: String,
    /// Extracted-text cache directory; empty disables caching.
    pub text_cache_dir: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_activity_keywords: ["活动", "讲座", "志愿", "竞赛", "报名", "通知"]
                .map(String::from)
                .to_vec(),
            default_class_keywords: Vec::new(),
            ocr_skip_if_vector_text: true,
            ocr_vector_text_min_chars: 64,
            ocr_dpi: 200,
            ocr_max_side: 4000,
            ocr_lang: "chi_sim+eng".to_string(),
            workers: 0,
            timeout_sec: 300.0,
            scan_paths: vec!["input".to_string()],
            student_roster_path: "students.json".to_string(),
            text_cache_dir: ".rollscan_cache".to_string(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from `path` (or the default location). A missing
    /// file yields defaults; a malformed file is a hard error so typos do not
    /// silently disable settings.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        if !path.exists() {
            tracing::debug!("未找到配置文件 {}，使用默认配置", path.display());
            return Ok(Self::default());
        }

        let bytes = std::fs::read(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let text = decode_text_bytes(&bytes);
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Expand `~` in a configured path.
    pub fn expand_path(raw: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(raw).into_owned())
    }

    pub fn pdf_settings(&self) -> PdfSettings {
        PdfSettings {
            skip_ocr_if_vector_text: self.ocr_skip_if_vector_text,
            vector_text_min_chars: self.ocr_vector_text_min_chars,
            dpi: self.ocr_dpi,
            max_render_side: self.ocr_max_side,
        }
    }

    pub fn ocr_config(&self) -> OcrConfig {
        OcrConfig {
            language: self.ocr_lang.clone(),
            model_path: None,
        }
    }

    /// Per-file timeout, if enabled.
    pub fn per_file_timeout(&self) -> Option<Duration> {
        if self.timeout_sec > 0.0 {
            Some(Duration::from_secs_f64(self.timeout_sec))
        } else {
            None
        }
    }

    /// Explicit worker count, if fixed in config.
    pub fn fixed_workers(&self) -> Option<usize> {
        (self.workers > 0).then_some(self.workers)
    }
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    students: HashMap<String, String>,
}

/// Load the student roster from a JSON file.
///
/// Returns an empty mapping when the file is missing or malformed; a run
/// without a roster still scans class-tag keywords.
pub fn load_student_roster(path: &Path) -> HashMap<String, String> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!("花名册读取失败 {}: {}", path.display(), err);
            return HashMap::new();
        }
    };
    let text = decode_text_bytes(&bytes);
    match serde_json::from_str::<RosterFile>(&text) {
        Ok(roster) => roster.students,
        Err(err) => {
            tracing::warn!("花名册解析失败 {}: {}", path.display(), err);
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_yields_defaults() {
        let cfg = ScanConfig::load(Some(Path::new("no/such/rollscan.yml"))).unwrap();
        assert_eq!(cfg.ocr_dpi, 200);
        assert!(cfg.ocr_skip_if_vector_text);
        assert_eq!(cfg.scan_paths, vec!["input".to_string()]);
    }

    #[test]
    fn test_partial_config_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollscan.yml");
        std::fs::write(
            &path,
            "ocr_dpi: 300\ndefault_class_keywords:\n  - 高铁2401\nworkers: 6\n",
        )
        .unwrap();
        let cfg = ScanConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.ocr_dpi, 300);
        assert_eq!(cfg.default_class_keywords, vec!["高铁2401".to_string()]);
        assert_eq!(cfg.fixed_workers(), Some(6));
        // Untouched fields keep their defaults.
        assert_eq!(cfg.ocr_vector_text_min_chars, 64);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollscan.yml");
        std::fs::write(&path, "ocr_dpi: [not a number\n").unwrap();
        assert!(ScanConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollscan.yml");
        std::fs::write(&path, "ocr_dpii: 300\n").unwrap();
        assert!(ScanConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_roster_loads_students() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");
        std::fs::write(
            &path,
            r#"{"students": {"张伟": "202401001", "李娜": "202401005"}}"#,
        )
        .unwrap();
        let roster = load_student_roster(&path);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.get("张伟").map(String::as_str), Some("202401001"));
    }

    #[test]
    fn test_roster_missing_or_malformed_degrades() {
        assert!(load_student_roster(Path::new("no/such.json")).is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_student_roster(&path).is_empty());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let cfg = ScanConfig {
            timeout_sec: 0.0,
            ..Default::default()
        };
        assert!(cfg.per_file_timeout().is_none());
    }
}
