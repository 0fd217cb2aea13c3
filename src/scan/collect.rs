//! Collection of scannable files from user-supplied paths.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions the extraction layer understands.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["docx", "pdf", "xlsx", "xls", "csv", "txt"];

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn walk_dir(dir: &Path, found: &mut BTreeSet<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!("无法读取目录 {}: {}", dir.display(), err);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, found);
        } else if is_supported(&path) {
            found.insert(path);
        }
    }
}

/// Collect every supported file located within `inputs` (files or directory
/// trees). Nonexistent inputs are warned about and skipped. Output order is
/// sorted and deduplicated, so batches are deterministic.
pub fn collect_supported_paths(inputs: &[String]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for raw in inputs {
        let path = PathBuf::from(raw);
        if path.is_file() {
            if is_supported(&path) {
                found.insert(path);
            }
        } else if path.is_dir() {
            walk_dir(&path, &mut found);
        } else {
            tracing::warn!("未找到路径: {}", raw);
        }
    }
    found.into_iter().collect()
}

/// Collect only PDF files, for the concurrent extraction entry point.
pub fn collect_pdf_paths(inputs: &[String]) -> Vec<PathBuf> {
    collect_supported_paths(inputs)
        .into_iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn touch(path: &Path) {
        let mut f = File::create(path).unwrap();
        f.write_all(b"x").unwrap();
    }

    #[test]
    fn test_collects_supported_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("nested");
        fs::create_dir(&sub).unwrap();
        touch(&dir.path().join("a.docx"));
        touch(&sub.join("b.PDF"));
        touch(&sub.join("ignore.bin"));

        let found =
            collect_supported_paths(&[dir.path().to_string_lossy().to_string()]);
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|p| p.ends_with("a.docx")));
        assert!(found.iter().any(|p| p.ends_with("b.PDF")));
    }

    #[test]
    fn test_explicit_file_and_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("list.xlsx");
        touch(&file);
        let arg = file.to_string_lossy().to_string();
        let found = collect_supported_paths(&[arg.clone(), arg]);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_missing_path_skipped() {
        let found = collect_supported_paths(&["does/not/exist".to_string()]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_pdf_filter() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.pdf"));
        touch(&dir.path().join("b.docx"));
        let found = collect_pdf_paths(&[dir.path().to_string_lossy().to_string()]);
        assert_eq!(found.len(), 1);
    }
}
