//! Re-processing through the external ocrmypdf tool.
//!
//! When neither embedded text nor the primary engine yields usable output,
//! the document is run through ocrmypdf (if installed), which rebuilds the
//! PDF with a fresh text layer; vector and OCR extraction are then retried
//! against the rebuilt file.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use super::model_utils::check_binary;

/// Whether the external tool can be used on this host.
pub fn is_available() -> bool {
    check_binary("ocrmypdf")
}

/// Re-process a PDF with ocrmypdf into `work_dir`.
///
/// Returns the path of the rebuilt PDF inside `work_dir`, or `None` when the
/// tool is missing or the conversion failed; the caller falls through to the
/// next stage either way.
pub fn reprocess(src_pdf: &Path, work_dir: &TempDir) -> Option<PathBuf> {
    if !is_available() {
        return None;
    }

    let dest = work_dir.path().join("reprocessed.pdf");
    let status = Command::new("ocrmypdf")
        .args(["--force-ocr", "--skip-text", "--quiet"])
        .arg(src_pdf)
        .arg(&dest)
        .status();

    match status {
        Ok(s) if s.success() && dest.exists() => Some(dest),
        Ok(s) => {
            tracing::warn!("ocrmypdf 退出码 {:?}: {}", s.code(), src_pdf.display());
            None
        }
        Err(err) => {
            tracing::warn!("ocrmypdf 执行失败: {}", err);
            None
        }
    }
}
