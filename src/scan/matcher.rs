//! Match aggregation: scanning one document's text against the roster and the
//! class-tag keywords.
//!
//! Student evidence is folded into one bucket per student, so an id hit and a
//! name hit for the same person produce a single row. Class-tag keywords are
//! reported one row per occurrence, unaggregated.

use serde::Serialize;
use std::collections::BTreeSet;

use super::document::ScannableDocument;
use super::roster::StudentDirectory;
use super::schema::{CLASS_TAG_LABEL, STATUS_OK};

/// Characters of context captured on each side of a match.
const SNIPPET_SPAN: usize = 20;

/// Name length sanity window, in characters. Single characters over-match and
/// anything past ten characters never matches a roster name exactly.
const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 10;

/// What kind of evidence a bucket has accumulated. Ordering fixes the label:
/// id evidence is always listed before name evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKind {
    StudentId,
    Name,
}

impl MatchKind {
    fn label(self) -> &'static str {
        match self {
            MatchKind::StudentId => "学号",
            MatchKind::Name => "姓名",
        }
    }
}

/// One finalized row of scan output. Field renames are the verbatim column
/// contract consumed by the report layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRow {
    #[serde(rename = "文件路径")]
    pub file_path: String,
    #[serde(rename = "活动名称")]
    pub activity: String,
    #[serde(rename = "状态")]
    pub status: String,
    #[serde(rename = "命中类型")]
    pub match_type: String,
    #[serde(rename = "命中值")]
    pub match_value: String,
    #[serde(rename = "学号")]
    pub student_id: String,
    #[serde(rename = "姓名")]
    pub student_name: String,
    #[serde(rename = "上下文片段")]
    pub snippet: String,
    #[serde(rename = "命中次数")]
    pub match_count: usize,
}

impl MatchRow {
    /// Placeholder row for a document with no hits at all.
    pub fn no_hit(path: &str, activity: &str) -> Self {
        Self::status_row(path, activity, super::schema::STATUS_NO_HIT)
    }

    /// Row carrying only a status (read failures, scan exceptions).
    pub fn status_row(path: &str, activity: &str, status: &str) -> Self {
        Self {
            file_path: path.to_string(),
            activity: activity.to_string(),
            status: status.to_string(),
            match_type: String::new(),
            match_value: String::new(),
            student_id: String::new(),
            student_name: String::new(),
            snippet: String::new(),
            match_count: 0,
        }
    }
}

/// Per-student accumulator, alive only while one document is being scanned.
#[derive(Debug)]
struct MatchBucket {
    kinds: BTreeSet<MatchKind>,
    values: Vec<String>,
    snippets: Vec<String>,
    count: usize,
    student_id: String,
    student_name: String,
}

impl MatchBucket {
    fn new() -> Self {
        Self {
            kinds: BTreeSet::new(),
            values: Vec::new(),
            snippets: Vec::new(),
            count: 0,
            student_id: String::new(),
            student_name: String::new(),
        }
    }

    fn record(&mut self, kind: MatchKind, value: &str, snippet: String) {
        self.kinds.insert(kind);
        if !self.values.iter().any(|v| v == value) {
            self.values.push(value.to_string());
        }
        if !self.snippets.contains(&snippet) {
            self.snippets.push(snippet);
        }
        self.count += 1;
    }

    fn finalize(self, document: &ScannableDocument) -> MatchRow {
        let match_type = self
            .kinds
            .iter()
            .map(|k| k.label())
            .collect::<Vec<_>>()
            .join("+");
        MatchRow {
            file_path: document.path.clone(),
            activity: document.activity.clone(),
            status: STATUS_OK.to_string(),
            match_type,
            match_value: self.values.join("、"),
            student_id: self.student_id,
            student_name: self.student_name,
            snippet: self.snippets.join("\n---\n"),
            match_count: self.count,
        }
    }
}

/// Buckets keyed by `sid:<id>` or `name:<name>`, kept in creation order.
#[derive(Default)]
struct BucketSet {
    entries: Vec<(String, MatchBucket)>,
}

impl BucketSet {
    fn ensure(&mut self, key: &str) -> &mut MatchBucket {
        if let Some(pos) = self.entries.iter().position(|(k, _)| k == key) {
            return &mut self.entries[pos].1;
        }
        self.entries.push((key.to_string(), MatchBucket::new()));
        let last = self.entries.len() - 1;
        &mut self.entries[last].1
    }
}

/// Every byte index where `token` occurs in `text`, non-overlapping.
///
/// The search resumes immediately after the end of each match, so indices are
/// strictly increasing and no two spans overlap.
pub fn find_occurrences(text: &str, token: &str) -> Vec<usize> {
    if token.is_empty() {
        return Vec::new();
    }
    let mut indices = Vec::new();
    let mut start = 0;
    while let Some(offset) = text[start..].find(token) {
        let index = start + offset;
        indices.push(index);
        start = index + token.len();
    }
    indices
}

/// Context window around a match: up to `SNIPPET_SPAN` characters on each
/// side, with embedded line breaks flattened to spaces.
fn text_context(text: &str, index: usize, match_len: usize) -> String {
    let start = text[..index]
        .char_indices()
        .rev()
        .take(SNIPPET_SPAN)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(index);
    let after = index + match_len;
    let end = text[after..]
        .char_indices()
        .nth(SNIPPET_SPAN)
        .map(|(i, _)| after + i)
        .unwrap_or(text.len());
    text[start..end]
        .replace(['\r', '\n'], " ")
}

/// Scan one document for student identifiers and class-tag keywords.
///
/// Returns an empty list when nothing matched; callers that want an explicit
/// "not found" record synthesize one with [`MatchRow::no_hit`].
pub fn scan_document_for_matches(
    document: &ScannableDocument,
    roster: &StudentDirectory,
    class_tags: &[String],
) -> Vec<MatchRow> {
    let text = document.text.as_str();
    let mut buckets = BucketSet::default();

    for (student_id, name) in roster.id_name_pairs() {
        for index in find_occurrences(text, student_id) {
            let snippet = text_context(text, index, student_id.len());
            let bucket = buckets.ensure(&format!("sid:{student_id}"));
            bucket.record(MatchKind::StudentId, student_id, snippet);
            bucket.student_id = student_id.to_string();
            bucket.student_name = name.to_string();
        }
    }

    for name in roster.searchable_names() {
        let chars = name.chars().count();
        if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&chars) {
            continue;
        }
        for index in find_occurrences(text, name) {
            let (student_id, display_name) = match roster.resolve_variant(name) {
                Some(entry) => (entry.student_id.clone(), entry.display_name.clone()),
                None => (String::new(), name.clone()),
            };
            let key = if student_id.is_empty() {
                format!("name:{name}")
            } else {
                format!("sid:{student_id}")
            };
            let snippet = text_context(text, index, name.len());
            let bucket = buckets.ensure(&key);
            bucket.record(MatchKind::Name, name, snippet);
            if bucket.student_id.is_empty() && !student_id.is_empty() {
                bucket.student_id = student_id;
            }
            if bucket.student_name.is_empty() {
                bucket.student_name = display_name;
            }
        }
    }

    let mut rows: Vec<MatchRow> = buckets
        .entries
        .into_iter()
        .map(|(_, bucket)| bucket.finalize(document))
        .collect();

    for raw_keyword in class_tags {
        let keyword = raw_keyword.trim();
        if keyword.is_empty() {
            continue;
        }
        for index in find_occurrences(text, keyword) {
            rows.push(MatchRow {
                file_path: document.path.clone(),
                activity: document.activity.clone(),
                status: STATUS_OK.to_string(),
                match_type: CLASS_TAG_LABEL.to_string(),
                match_value: keyword.to_string(),
                student_id: String::new(),
                student_name: String::new(),
                snippet: text_context(text, index, keyword.len()),
                match_count: 1,
            });
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn roster(pairs: &[(&str, &str)]) -> StudentDirectory {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(n, i)| (n.to_string(), i.to_string()))
            .collect();
        StudentDirectory::from_mapping(&map)
    }

    fn document(text: &str) -> ScannableDocument {
        ScannableDocument {
            path: "input/活动.docx".to_string(),
            text: text.to_string(),
            activity: "志愿活动".to_string(),
        }
    }

    #[test]
    fn test_find_occurrences_non_overlapping() {
        let indices = find_occurrences("aaaa", "aa");
        assert_eq!(indices, vec![0, 2]);
        for &i in &indices {
            assert_eq!(&"aaaa"[i..i + 2], "aa");
        }
    }

    #[test]
    fn test_find_occurrences_strictly_increasing() {
        let text = "x 202401001 y 202401001 z";
        let indices = find_occurrences(text, "202401001");
        assert_eq!(indices.len(), 2);
        assert!(indices[0] < indices[1]);
        assert!(indices[1] >= indices[0] + "202401001".len());
    }

    #[test]
    fn test_find_occurrences_empty_token() {
        assert!(find_occurrences("abc", "").is_empty());
    }

    #[test]
    fn test_id_and_name_merge_into_one_row() {
        let roster = roster(&[("张伟", "202401001")]);
        let doc = document("提示：张伟 已报名 202401001 的活动");
        let rows = scan_document_for_matches(&doc, &roster, &[]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.match_type, "学号+姓名");
        assert_eq!(row.match_count, 2);
        assert_eq!(row.student_id, "202401001");
        assert_eq!(row.student_name, "张伟");
        assert_eq!(row.status, "OK");
    }

    #[test]
    fn test_example_scenario_absent_keyword() {
        let roster = roster(&[("张伟", "202401001")]);
        let doc = document("提示：张伟 已报名 202401001 的活动");
        let rows =
            scan_document_for_matches(&doc, &roster, &["高铁2401".to_string()]);
        assert_eq!(rows.len(), 1, "keyword absent from text adds no rows");
        assert_eq!(rows[0].match_type, "学号+姓名");
    }

    #[test]
    fn test_scan_is_idempotent() {
        let roster = roster(&[("张伟", "202401001"), ("李娜", "202401005")]);
        let doc = document("张伟、李娜都参加了。202401001 签到。");
        let tags = vec!["高铁2401".to_string()];
        let first = scan_document_for_matches(&doc, &roster, &tags);
        let second = scan_document_for_matches(&doc, &roster, &tags);
        assert_eq!(first, second);
    }

    #[test]
    fn test_class_tag_rows_per_occurrence() {
        let roster = roster(&[]);
        let doc = document("高铁2401 班与 高铁2401 班合办");
        let rows =
            scan_document_for_matches(&doc, &roster, &["高铁2401".to_string()]);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.match_type, CLASS_TAG_LABEL);
            assert_eq!(row.match_value, "高铁2401");
            assert_eq!(row.match_count, 1);
        }
    }

    #[test]
    fn test_dotted_variant_routes_to_same_bucket() {
        let roster = roster(&[("阿依古丽·买买提", "202401002")]);
        let doc = document("名单：阿依古丽买买提、阿依古丽·买买提");
        let rows = scan_document_for_matches(&doc, &roster, &[]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.student_id, "202401002");
        assert_eq!(row.student_name, "阿依古丽·买买提");
        assert_eq!(row.match_count, 2);
        // Both literal spellings are recorded as matched values.
        assert!(row.match_value.contains("阿依古丽买买提"));
        assert!(row.match_value.contains("阿依古丽·买买提"));
    }

    #[test]
    fn test_snippets_flatten_newlines_and_dedupe() {
        let roster = roster(&[("张伟", "202401001")]);
        let doc = document("第一行\n张伟\n第三行");
        let rows = scan_document_for_matches(&doc, &roster, &[]);
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].snippet.contains('\n'));
        assert!(rows[0].snippet.contains("张伟"));
    }

    #[test]
    fn test_name_outside_sanity_window_skipped() {
        // A single-character roster name must not over-match.
        let roster = roster(&[("伟", "202401009")]);
        let doc = document("伟大的事业由伟大的人完成");
        let rows = scan_document_for_matches(&doc, &roster, &[]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_no_hits_returns_empty() {
        let roster = roster(&[("张伟", "202401001")]);
        let doc = document("没有任何相关内容");
        assert!(scan_document_for_matches(&doc, &roster, &[]).is_empty());
    }

    #[test]
    fn test_count_sums_id_and_name_occurrences() {
        let roster = roster(&[("张伟", "202401001")]);
        let doc = document("张伟 202401001 张伟 202401001 张伟");
        let rows = scan_document_for_matches(&doc, &roster, &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].match_count, 5);
    }
}
