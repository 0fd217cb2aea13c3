//! Column and label constants shared between scanning and reporting.
//!
//! The report layer consumes these names verbatim; changing one changes the
//! output contract.

/// Detail-sheet column headers.
pub const COLUMN_FILE_PATH: &str = "文件路径";
pub const COLUMN_ACTIVITY_NAME: &str = "活动名称";
pub const COLUMN_STATUS: &str = "状态";
pub const COLUMN_MATCH_TYPE: &str = "命中类型";
pub const COLUMN_MATCH_VALUE: &str = "命中值";
pub const COLUMN_STUDENT_ID: &str = "学号";
pub const COLUMN_STUDENT_NAME: &str = "姓名";
pub const COLUMN_SNIPPET: &str = "上下文片段";
pub const COLUMN_MATCH_COUNT: &str = "命中次数";

/// Aggregate-sheet column headers.
pub const COLUMN_ACTIVITY_FILE_COUNT: &str = "文件数";
pub const COLUMN_MATCH_TOTAL: &str = "命中合计";
pub const COLUMN_PERSON_ACTIVITY_COUNT: &str = "活动数";
pub const COLUMN_PERSON_ACTIVITY_LIST: &str = "活动列表";

/// Sheet names for the exported report.
pub const DETAIL_SHEET_NAME: &str = "明细";
pub const PER_ACTIVITY_SHEET_NAME: &str = "按活动汇总";
pub const PER_PERSON_SHEET_NAME: &str = "按人汇总";
pub const CLASS_TAG_SHEET_NAME: &str = "班级命中";

/// Match-type label for class-tag keyword hits.
pub const CLASS_TAG_LABEL: &str = "班级关键词";

/// Row status values.
pub const STATUS_OK: &str = "OK";
pub const STATUS_NO_HIT: &str = "未命中";

/// Match-type labels that identify a student row (as opposed to a class-tag
/// row) in the detail sheet.
pub const STUDENT_MATCH_TYPES: [&str; 3] = ["学号", "姓名", "学号+姓名"];
