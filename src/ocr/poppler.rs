//! Wrappers around the Poppler CLI tools (pdftotext, pdfinfo, pdftoppm).
//!
//! Rendering goes through [`render_page`], which caps the output resolution
//! and retries with degraded parameters before giving up on a page.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::backend::OcrError;
use super::extractor::ExtractionError;

fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
    error_prefix: &str,
) -> Result<String, ExtractionError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractionError::ExtractionFailed(format!(
                    "{}: {}",
                    error_prefix, stderr
                )))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractionError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractionError::Io(e)),
    }
}

/// Extract embedded text from the whole document.
pub fn run_pdftotext(file_path: &Path) -> Result<String, ExtractionError> {
    let output = Command::new("pdftotext")
        .args(["-layout", "-enc", "UTF-8"])
        .arg(file_path)
        .arg("-")
        .output();

    handle_cmd_output(output, "pdftotext (install poppler-utils)", "pdftotext failed")
}

/// Page geometry reported by pdfinfo, in PostScript points.
#[derive(Debug, Clone, Copy)]
pub struct PdfInfo {
    pub pages: u32,
    pub width_pts: f64,
    pub height_pts: f64,
}

/// Read page count and media box size via pdfinfo.
pub fn run_pdfinfo(file_path: &Path) -> Result<PdfInfo, ExtractionError> {
    let output = Command::new("pdfinfo").arg(file_path).output();
    let stdout = handle_cmd_output(output, "pdfinfo (install poppler-utils)", "pdfinfo failed")?;

    let mut pages = None;
    let mut width = None;
    let mut height = None;
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Pages:") {
            pages = rest.trim().parse::<u32>().ok();
        } else if let Some(rest) = line.strip_prefix("Page size:") {
            // "Page size:      595.28 x 841.89 pts (A4)"
            let mut nums = rest
                .split_whitespace()
                .filter_map(|tok| tok.parse::<f64>().ok());
            width = nums.next();
            height = nums.next();
        }
    }

    match (pages, width, height) {
        (Some(pages), Some(width_pts), Some(height_pts)) if pages > 0 => Ok(PdfInfo {
            pages,
            width_pts,
            height_pts,
        }),
        (Some(pages), _, _) if pages > 0 => Ok(PdfInfo {
            pages,
            // A4 default when pdfinfo reports no usable geometry.
            width_pts: 595.0,
            height_pts: 842.0,
        }),
        _ => Err(ExtractionError::ExtractionFailed(
            "pdfinfo reported no pages".to_string(),
        )),
    }
}

/// Resolution to render at so that neither side exceeds `max_side` pixels.
///
/// Poppler renders at pts/72 × dpi pixels, so oversized media boxes get their
/// DPI scaled down proportionally instead of producing giant rasters.
pub fn compute_render_dpi(info: &PdfInfo, requested_dpi: u32, max_side: u32) -> u32 {
    let longest_pts = info.width_pts.max(info.height_pts).max(1.0);
    let rendered = longest_pts / 72.0 * f64::from(requested_dpi);
    if rendered <= f64::from(max_side) {
        return requested_dpi.max(1);
    }
    let scaled = f64::from(max_side) * 72.0 / longest_pts;
    (scaled.floor() as u32).max(36)
}

fn find_page_image(temp_path: &Path, page_num: u32) -> Option<PathBuf> {
    // pdftoppm names files page-01.png, page-001.png, ... depending on count.
    for digits in [1, 2, 3, 4] {
        let filename = format!("page-{:0width$}.png", page_num, width = digits);
        let path = temp_path.join(&filename);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

fn run_pdftoppm(
    pdf_path: &Path,
    page: u32,
    dpi: u32,
    grayscale: bool,
    output_dir: &Path,
) -> Result<PathBuf, OcrError> {
    let page_str = page.to_string();
    let dpi_str = dpi.to_string();
    let output_prefix = output_dir.join("page");

    let mut cmd = Command::new("pdftoppm");
    cmd.args(["-png", "-r", &dpi_str, "-f", &page_str, "-l", &page_str]);
    if grayscale {
        cmd.arg("-gray");
    }
    let status = cmd.arg(pdf_path).arg(&output_prefix).status();

    match status {
        Ok(s) if s.success() => find_page_image(output_dir, page)
            .ok_or_else(|| OcrError::OcrFailed(format!("No image generated for page {}", page))),
        Ok(_) => Err(OcrError::OcrFailed(
            "pdftoppm failed to convert PDF page".to_string(),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::BackendNotAvailable(
            "pdftoppm not found (install poppler-utils)".to_string(),
        )),
        Err(e) => Err(OcrError::Io(e)),
    }
}

/// Render one page to PNG, retrying with degraded parameters on failure.
///
/// The first attempt uses the computed DPI in color; malformed page resources
/// get a second attempt in grayscale at half resolution. `Ok(None)` means
/// both attempts failed and the page should be treated as a blank placeholder
/// so the rest of the document still processes.
pub fn render_page(
    pdf_path: &Path,
    page: u32,
    dpi: u32,
    output_dir: &Path,
) -> Result<Option<PathBuf>, OcrError> {
    match run_pdftoppm(pdf_path, page, dpi, false, output_dir) {
        Ok(path) => Ok(Some(path)),
        Err(OcrError::BackendNotAvailable(hint)) => Err(OcrError::BackendNotAvailable(hint)),
        Err(first_err) => {
            tracing::warn!(
                "第 {} 页渲染失败（{}），降级重试",
                page,
                first_err
            );
            let fallback_dpi = (dpi / 2).max(72);
            match run_pdftoppm(pdf_path, page, fallback_dpi, true, output_dir) {
                Ok(path) => Ok(Some(path)),
                Err(OcrError::BackendNotAvailable(hint)) => {
                    Err(OcrError::BackendNotAvailable(hint))
                }
                Err(second_err) => {
                    tracing::warn!("第 {} 页降级渲染仍失败: {}", page, second_err);
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width_pts: f64, height_pts: f64) -> PdfInfo {
        PdfInfo {
            pages: 1,
            width_pts,
            height_pts,
        }
    }

    #[test]
    fn test_dpi_unchanged_when_within_cap() {
        // A4 at 200 dpi is about 2339 px on the long side.
        assert_eq!(compute_render_dpi(&info(595.0, 842.0), 200, 4000), 200);
    }

    #[test]
    fn test_dpi_scaled_down_for_oversized_pages() {
        // A0-style poster page would blow past the cap at 200 dpi.
        let dpi = compute_render_dpi(&info(2384.0, 3370.0), 200, 4000);
        assert!(dpi < 200);
        let rendered = 3370.0 / 72.0 * f64::from(dpi);
        assert!(rendered <= 4000.0);
    }

    #[test]
    fn test_dpi_floor() {
        let dpi = compute_render_dpi(&info(100_000.0, 100_000.0), 300, 1000);
        assert!(dpi >= 36);
    }
}
