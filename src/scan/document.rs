//! Scannable document model and activity-title derivation.

use std::path::Path;

/// Lightweight representation of a file being scanned. Constructed once after
/// extraction completes; read-only afterwards.
#[derive(Debug, Clone)]
pub struct ScannableDocument {
    pub path: String,
    pub text: String,
    pub activity: String,
}

impl ScannableDocument {
    pub fn new(path: &Path, text: String, activity_keywords: &[String]) -> Self {
        let path_str = path.to_string_lossy().to_string();
        let activity = derive_activity_title(path, &text, activity_keywords);
        Self {
            path: path_str,
            text,
            activity,
        }
    }
}

const TITLE_MAX_CHARS: usize = 80;
const PARENT_MAX_CHARS: usize = 40;

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Derive a short activity title from the document text or the file path.
///
/// The first non-empty line wins when it mentions one of the configured
/// activity keywords; otherwise the file stem is used. A short parent
/// directory name is appended for context when it is not already part of the
/// title.
pub fn derive_activity_title(path: &Path, text: &str, activity_keywords: &[String]) -> String {
    let first_line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut title = if activity_keywords.iter().any(|kw| first_line.contains(kw.as_str())) {
        truncate_chars(first_line, TITLE_MAX_CHARS)
    } else {
        truncate_chars(&stem, TITLE_MAX_CHARS)
    };

    if let Some(parent) = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().to_string())
    {
        if !parent.is_empty()
            && !title.contains(&parent)
            && parent.chars().count() <= PARENT_MAX_CHARS
        {
            title = format!("{title}（{parent}）");
        }
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn keywords() -> Vec<String> {
        vec!["活动".to_string(), "志愿".to_string()]
    }

    #[test]
    fn test_title_from_first_line_with_keyword() {
        let path = PathBuf::from("input/第一期/报名表.docx");
        let title = derive_activity_title(&path, "志愿服务活动报名\n正文", &keywords());
        assert!(title.starts_with("志愿服务活动报名"));
        assert!(title.contains("第一期"));
    }

    #[test]
    fn test_title_falls_back_to_file_stem() {
        let path = PathBuf::from("input/第一期/签到表.pdf");
        let title = derive_activity_title(&path, "无关紧要的第一行\n", &keywords());
        assert!(title.starts_with("签到表"));
    }

    #[test]
    fn test_parent_not_repeated_when_already_in_title() {
        let path = PathBuf::from("input/志愿活动/志愿活动签到.pdf");
        let title = derive_activity_title(&path, "", &keywords());
        assert_eq!(title.matches("志愿活动").count(), 1);
    }

    #[test]
    fn test_long_first_line_truncated() {
        let path = PathBuf::from("a.docx");
        let long_line = format!("活动{}", "很".repeat(200));
        let title = derive_activity_title(&path, &long_line, &keywords());
        assert!(title.chars().count() <= TITLE_MAX_CHARS + PARENT_MAX_CHARS + 2);
    }
}
