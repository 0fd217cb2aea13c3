//! Report export and run-artifact bundling.
//!
//! Sheets are written as CSV (UTF-8 with BOM so spreadsheet apps detect the
//! encoding) plus a single JSON document carrying all tables. Matched source
//! files are copied next to the report so one folder holds the whole run.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::scan::schema::{
    CLASS_TAG_SHEET_NAME, COLUMN_ACTIVITY_FILE_COUNT, COLUMN_ACTIVITY_NAME, COLUMN_FILE_PATH,
    COLUMN_MATCH_COUNT, COLUMN_MATCH_TOTAL, COLUMN_MATCH_TYPE, COLUMN_MATCH_VALUE,
    COLUMN_PERSON_ACTIVITY_COUNT, COLUMN_PERSON_ACTIVITY_LIST, COLUMN_SNIPPET, COLUMN_STATUS,
    COLUMN_STUDENT_ID, COLUMN_STUDENT_NAME, DETAIL_SHEET_NAME, PER_ACTIVITY_SHEET_NAME,
    PER_PERSON_SHEET_NAME,
};
use crate::scan::MatchRow;

use super::{ActivityRow, PersonRow, ReportTables};

const UTF8_BOM: &str = "\u{feff}";
const SOURCE_SUBDIR: &str = "source_files";

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| csv_escape(f))
        .collect::<Vec<_>>()
        .join(",")
}

fn match_row_header() -> String {
    csv_line(&[
        COLUMN_STUDENT_NAME,
        COLUMN_ACTIVITY_NAME,
        COLUMN_FILE_PATH,
        COLUMN_STATUS,
        COLUMN_MATCH_TYPE,
        COLUMN_MATCH_VALUE,
        COLUMN_STUDENT_ID,
        COLUMN_SNIPPET,
        COLUMN_MATCH_COUNT,
    ])
}

fn match_row_line(row: &MatchRow) -> String {
    let count = row.match_count.to_string();
    csv_line(&[
        &row.student_name,
        &row.activity,
        &row.file_path,
        &row.status,
        &row.match_type,
        &row.match_value,
        &row.student_id,
        &row.snippet,
        &count,
    ])
}

fn write_sheet(dir: &Path, sheet_name: &str, header: String, lines: Vec<String>) -> anyhow::Result<()> {
    let path = dir.join(format!("{sheet_name}.csv"));
    let mut file = fs::File::create(&path)
        .with_context(|| format!("创建报表文件失败: {}", path.display()))?;
    write!(file, "{UTF8_BOM}")?;
    writeln!(file, "{header}")?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    Ok(())
}

/// Write all report sheets (CSV per sheet + combined JSON) into `dir`.
pub fn export_report(dir: &Path, tables: &ReportTables) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("创建输出目录失败: {}", dir.display()))?;

    write_sheet(
        dir,
        DETAIL_SHEET_NAME,
        match_row_header(),
        tables.detail.iter().map(match_row_line).collect(),
    )?;

    write_sheet(
        dir,
        PER_ACTIVITY_SHEET_NAME,
        csv_line(&[
            COLUMN_STUDENT_ID,
            COLUMN_STUDENT_NAME,
            COLUMN_ACTIVITY_NAME,
            COLUMN_ACTIVITY_FILE_COUNT,
            COLUMN_MATCH_TOTAL,
        ]),
        tables
            .per_activity
            .iter()
            .map(|row: &ActivityRow| {
                let files = row.file_count.to_string();
                let total = row.match_total.to_string();
                csv_line(&[
                    &row.student_id,
                    &row.student_name,
                    &row.activity,
                    &files,
                    &total,
                ])
            })
            .collect(),
    )?;

    write_sheet(
        dir,
        PER_PERSON_SHEET_NAME,
        csv_line(&[
            COLUMN_STUDENT_ID,
            COLUMN_STUDENT_NAME,
            COLUMN_PERSON_ACTIVITY_COUNT,
            COLUMN_PERSON_ACTIVITY_LIST,
        ]),
        tables
            .per_person
            .iter()
            .map(|row: &PersonRow| {
                let count = row.activity_count.to_string();
                csv_line(&[
                    &row.student_id,
                    &row.student_name,
                    &count,
                    &row.activity_list,
                ])
            })
            .collect(),
    )?;

    write_sheet(
        dir,
        CLASS_TAG_SHEET_NAME,
        match_row_header(),
        tables.class_hits.iter().map(match_row_line).collect(),
    )?;

    let envelope = serde_json::json!({
        "generated_at": chrono::Local::now().to_rfc3339(),
        "tables": tables,
    });
    let json_path = dir.join("report.json");
    fs::write(&json_path, serde_json::to_string_pretty(&envelope)?)
        .with_context(|| format!("写入 JSON 报表失败: {}", json_path.display()))?;

    Ok(())
}

/// Create a fresh run directory under `archive_root`, suffixing `_2`, `_3`…
/// when a previous run used the same name.
pub fn create_run_dir(archive_root: &Path, run_name: &str) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(archive_root)
        .with_context(|| format!("创建归档目录失败: {}", archive_root.display()))?;

    let mut run_dir = archive_root.join(run_name);
    let mut suffix = 1;
    while run_dir.exists() {
        suffix += 1;
        run_dir = archive_root.join(format!("{run_name}_{suffix}"));
    }
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("创建运行目录失败: {}", run_dir.display()))?;
    Ok(run_dir)
}

/// Relative archive path for one source file, based on the scan roots it was
/// collected under.
fn relative_to_targets(path: &Path, targets: &[PathBuf]) -> PathBuf {
    for root in targets {
        if root.is_file() {
            if path == root {
                if let Some(name) = root.file_name() {
                    return PathBuf::from(name);
                }
            }
        } else if let Ok(rel) = path.strip_prefix(root) {
            let base = root
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            return base.join(rel);
        }
    }
    path.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf())
}

/// Copy every matched source file into `<run_dir>/source_files/`, keeping the
/// layout relative to the scan roots. Copy failures only log; an unreadable
/// source must not lose the report.
pub fn copy_matched_sources(run_dir: &Path, files: &[PathBuf], targets: &[PathBuf]) {
    let sources_root = run_dir.join(SOURCE_SUBDIR);
    for file in files {
        let destination = sources_root.join(relative_to_targets(file, targets));
        if let Some(parent) = destination.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                tracing::warn!("创建目录失败 {}: {}", parent.display(), err);
                continue;
            }
        }
        if let Err(err) = fs::copy(file, &destination) {
            tracing::warn!(
                "复制源文件失败 {} -> {}: {}",
                file.display(),
                destination.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::build_report_tables;
    use crate::scan::StudentDirectory;
    use std::collections::HashMap;

    #[test]
    fn test_csv_escaping() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_export_writes_all_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let roster = StudentDirectory::from_mapping(&HashMap::new());
        let tables = build_report_tables(&[MatchRow::no_hit("a.pdf", "活动")], &roster);

        export_report(dir.path(), &tables).unwrap();

        for sheet in [
            DETAIL_SHEET_NAME,
            PER_ACTIVITY_SHEET_NAME,
            PER_PERSON_SHEET_NAME,
            CLASS_TAG_SHEET_NAME,
        ] {
            let path = dir.path().join(format!("{sheet}.csv"));
            let content = std::fs::read_to_string(&path).unwrap();
            assert!(content.starts_with(UTF8_BOM), "{sheet} missing BOM");
        }
        assert!(dir.path().join("report.json").exists());
    }

    #[test]
    fn test_run_dir_suffixes_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let first = create_run_dir(dir.path(), "activity_hits").unwrap();
        let second = create_run_dir(dir.path(), "activity_hits").unwrap();
        assert_ne!(first, second);
        assert!(second.ends_with("activity_hits_2"));
    }

    #[test]
    fn test_sources_copied_relative_to_roots() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        std::fs::create_dir_all(input.join("第一期")).unwrap();
        let src = input.join("第一期/报名表.docx");
        std::fs::write(&src, b"doc").unwrap();

        let run_dir = dir.path().join("run");
        std::fs::create_dir_all(&run_dir).unwrap();
        copy_matched_sources(&run_dir, &[src], &[input]);

        assert!(run_dir
            .join("source_files/input/第一期/报名表.docx")
            .exists());
    }
}
