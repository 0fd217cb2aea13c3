//! Report tables assembled from raw scan rows.
//!
//! The detail rows come straight from the match aggregator; the per-activity
//! and per-person sheets are aggregations over the student rows only, and
//! class-tag hits are split into their own sheet.

mod export;

pub use export::{copy_matched_sources, create_run_dir, export_report};

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Serialize;

use crate::scan::schema::{CLASS_TAG_LABEL, STATUS_OK, STUDENT_MATCH_TYPES};
use crate::scan::{MatchRow, StudentDirectory};

/// One row of the per-activity aggregation sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRow {
    #[serde(rename = "学号")]
    pub student_id: String,
    #[serde(rename = "姓名")]
    pub student_name: String,
    #[serde(rename = "活动名称")]
    pub activity: String,
    #[serde(rename = "文件数")]
    pub file_count: usize,
    #[serde(rename = "命中合计")]
    pub match_total: usize,
}

/// One row of the per-person aggregation sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonRow {
    #[serde(rename = "学号")]
    pub student_id: String,
    #[serde(rename = "姓名")]
    pub student_name: String,
    #[serde(rename = "活动数")]
    pub activity_count: usize,
    #[serde(rename = "活动列表")]
    pub activity_list: String,
}

/// All four report sheets.
#[derive(Debug, Serialize)]
pub struct ReportTables {
    pub detail: Vec<MatchRow>,
    pub per_activity: Vec<ActivityRow>,
    pub per_person: Vec<PersonRow>,
    pub class_hits: Vec<MatchRow>,
}

fn is_student_hit(row: &MatchRow) -> bool {
    row.status == STATUS_OK
        && row.match_count > 0
        && STUDENT_MATCH_TYPES.contains(&row.match_type.as_str())
}

/// Transform raw scan rows into the tables needed for reporting.
pub fn build_report_tables(all_rows: &[MatchRow], roster: &StudentDirectory) -> ReportTables {
    let mut detail: Vec<MatchRow> = all_rows.to_vec();

    // Name-only rows that resolved an id still get a display name on the
    // aggregate sheets.
    for row in detail.iter_mut() {
        if is_student_hit(row) && row.student_name.is_empty() && !row.student_id.is_empty() {
            if let Some(name) = roster.resolve_name(&row.student_id) {
                row.student_name = name.to_string();
            }
        }
    }

    // (id, name, activity) → (distinct files, summed count)
    let mut grouped: BTreeMap<(String, String, String), (BTreeSet<String>, usize)> =
        BTreeMap::new();
    for row in detail.iter().filter(|r| is_student_hit(r)) {
        let key = (
            row.student_id.clone(),
            row.student_name.clone(),
            row.activity.clone(),
        );
        let entry = grouped.entry(key).or_default();
        entry.0.insert(row.file_path.clone());
        entry.1 += row.match_count;
    }
    let per_activity: Vec<ActivityRow> = grouped
        .into_iter()
        .map(|((student_id, student_name, activity), (files, total))| ActivityRow {
            student_id,
            student_name,
            activity,
            file_count: files.len(),
            match_total: total,
        })
        .collect();

    // (id, name) → distinct activities
    let mut persons: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
    for row in &per_activity {
        persons
            .entry((row.student_id.clone(), row.student_name.clone()))
            .or_default()
            .insert(row.activity.clone());
    }
    let per_person: Vec<PersonRow> = persons
        .into_iter()
        .map(|((student_id, student_name), activities)| PersonRow {
            student_id,
            student_name,
            activity_count: activities.len(),
            activity_list: activities.into_iter().collect::<Vec<_>>().join("、"),
        })
        .collect();

    let class_hits: Vec<MatchRow> = detail
        .iter()
        .filter(|r| r.status == STATUS_OK && r.match_type == CLASS_TAG_LABEL)
        .cloned()
        .collect();

    // Stable presentation order for the detail sheet: name, activity, path.
    detail.sort_by(|a, b| {
        (&a.student_name, &a.activity, &a.file_path)
            .cmp(&(&b.student_name, &b.activity, &b.file_path))
    });

    ReportTables {
        detail,
        per_activity,
        per_person,
        class_hits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn roster() -> StudentDirectory {
        let map: HashMap<String, String> = [("张伟", "202401001"), ("李娜", "202401005")]
            .iter()
            .map(|(n, i)| (n.to_string(), i.to_string()))
            .collect();
        StudentDirectory::from_mapping(&map)
    }

    fn student_row(path: &str, activity: &str, id: &str, name: &str, count: usize) -> MatchRow {
        MatchRow {
            file_path: path.to_string(),
            activity: activity.to_string(),
            status: "OK".to_string(),
            match_type: "学号+姓名".to_string(),
            match_value: String::new(),
            student_id: id.to_string(),
            student_name: name.to_string(),
            snippet: String::new(),
            match_count: count,
        }
    }

    #[test]
    fn test_per_activity_aggregates_files_and_counts() {
        let rows = vec![
            student_row("a.pdf", "志愿活动", "202401001", "张伟", 2),
            student_row("b.pdf", "志愿活动", "202401001", "张伟", 3),
            student_row("a.pdf", "志愿活动", "202401005", "李娜", 1),
        ];
        let tables = build_report_tables(&rows, &roster());
        assert_eq!(tables.per_activity.len(), 2);
        let zhang = tables
            .per_activity
            .iter()
            .find(|r| r.student_id == "202401001")
            .unwrap();
        assert_eq!(zhang.file_count, 2);
        assert_eq!(zhang.match_total, 5);
    }

    #[test]
    fn test_per_person_counts_distinct_activities() {
        let rows = vec![
            student_row("a.pdf", "志愿活动", "202401001", "张伟", 1),
            student_row("b.pdf", "学科竞赛", "202401001", "张伟", 1),
            student_row("c.pdf", "志愿活动", "202401001", "张伟", 4),
        ];
        let tables = build_report_tables(&rows, &roster());
        assert_eq!(tables.per_person.len(), 1);
        let person = &tables.per_person[0];
        assert_eq!(person.activity_count, 2);
        assert!(person.activity_list.contains("志愿活动"));
        assert!(person.activity_list.contains("学科竞赛"));
    }

    #[test]
    fn test_missing_name_backfilled_from_roster() {
        let mut row = student_row("a.pdf", "志愿活动", "202401001", "", 1);
        row.match_type = "学号".to_string();
        let tables = build_report_tables(&[row], &roster());
        assert_eq!(tables.per_activity[0].student_name, "张伟");
    }

    #[test]
    fn test_class_hits_split_out() {
        let mut tag_row = student_row("a.pdf", "志愿活动", "", "", 1);
        tag_row.match_type = CLASS_TAG_LABEL.to_string();
        let status_row = MatchRow::no_hit("b.pdf", "其他");
        let tables = build_report_tables(&[tag_row, status_row], &roster());
        assert_eq!(tables.class_hits.len(), 1);
        assert!(tables.per_activity.is_empty());
        assert_eq!(tables.detail.len(), 2);
    }

    #[test]
    fn test_no_hit_rows_do_not_aggregate() {
        let rows = vec![MatchRow::no_hit("a.pdf", "活动")];
        let tables = build_report_tables(&rows, &roster());
        assert!(tables.per_activity.is_empty());
        assert!(tables.per_person.is_empty());
    }
}
