//! CLI commands implementation.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::{load_student_roster, ScanConfig};
use crate::ocr::{TextCache, TextExtractor};
use crate::report::{
    build_report_tables, copy_matched_sources, create_run_dir, export_report,
};
use crate::scan::schema::STATUS_OK;
use crate::scan::{
    collect_pdf_paths, collect_supported_paths, scan_document_for_matches, MatchRow,
    ScannableDocument, StudentDirectory,
};
use crate::services::{
    calibrate_pdf_workers, extract_pdfs_concurrently, ExtractionEvent, ExtractionOutcome,
};

#[derive(Parser)]
#[command(name = "rollscan")]
#[command(about = "班级活动资料扫描器 - scans office documents for roster evidence")]
#[command(version)]
pub struct Cli {
    /// Config file path (default: ./rollscan.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Scan documents for roster and class-tag evidence, write the report
    Scan {
        /// Files or directories to scan (default: config scan_paths)
        paths: Vec<String>,
        /// Run name for the output folder under scan_outputs/
        #[arg(short, long, default_value = "activity_hits")]
        out: String,
        /// Class-tag keywords, comma separated (overrides config)
        #[arg(long)]
        class_tags: Option<String>,
        /// Number of extraction workers (0 = calibrate automatically)
        #[arg(short, long, default_value = "0")]
        workers: usize,
        /// Per-file extraction timeout in seconds (overrides config)
        #[arg(short, long)]
        timeout: Option<f64>,
        /// Open files whose extraction failed, for manual review
        #[arg(long)]
        open_failed: bool,
        /// Disable the extracted-text cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Concurrently extract PDF text only; print a JSON summary
    ReadPdfs {
        /// PDF files or directories
        paths: Vec<String>,
        /// Number of extraction workers (0 = calibrate automatically)
        #[arg(short, long, default_value = "0")]
        workers: usize,
        /// Per-file extraction timeout in seconds (overrides config)
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// Check availability of external extraction tools and OCR engines
    OcrCheck,

    /// Run the worker calibration benchmark and print the selection
    Calibrate {
        /// Upper cap on the worker count
        #[arg(long)]
        cap: Option<usize>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ScanConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            paths,
            out,
            class_tags,
            workers,
            timeout,
            open_failed,
            no_cache,
        } => {
            cmd_scan(
                &config,
                paths,
                &out,
                class_tags.as_deref(),
                workers,
                timeout,
                open_failed,
                no_cache,
            )
            .await
        }
        Commands::ReadPdfs {
            paths,
            workers,
            timeout,
        } => cmd_read_pdfs(&config, paths, workers, timeout).await,
        Commands::OcrCheck => cmd_ocr_check(&config),
        Commands::Calibrate { cap } => cmd_calibrate(cap),
    }
}

fn resolve_class_tags(config: &ScanConfig, raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(value) if !value.trim().is_empty() => value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => config.default_class_keywords.clone(),
    }
}

fn build_extractor(config: &ScanConfig, no_cache: bool) -> TextExtractor {
    let extractor = TextExtractor::new(config.pdf_settings(), config.ocr_config());
    if no_cache || config.text_cache_dir.trim().is_empty() {
        return extractor;
    }
    extractor.with_cache(TextCache::new(ScanConfig::expand_path(&config.text_cache_dir)))
}

/// Spawn a task that renders extraction progress from coordinator events.
fn spawn_progress_printer(
    mut rx: mpsc::Receiver<ExtractionEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;
        while let Some(event) = rx.recv().await {
            match event {
                ExtractionEvent::BatchStarted { total, workers } => {
                    println!(
                        "{} 并发提取 {} 份 PDF（{} 个工作线程）",
                        style("→").cyan(),
                        total,
                        workers
                    );
                    let pb = ProgressBar::new(total as u64);
                    pb.set_style(
                        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar()),
                    );
                    bar = Some(pb);
                }
                ExtractionEvent::FileStarted { path } => {
                    if let Some(pb) = &bar {
                        pb.set_message(display_name(&path));
                    }
                }
                ExtractionEvent::FileCompleted { .. } => {
                    if let Some(pb) = &bar {
                        pb.inc(1);
                    }
                }
                ExtractionEvent::FileFailed { path, error } => {
                    if let Some(pb) = &bar {
                        pb.println(format!(
                            "  {} {}: {}",
                            style("✗").red(),
                            display_name(&path),
                            error
                        ));
                        pb.inc(1);
                    }
                }
            }
        }
        if let Some(pb) = bar {
            pb.finish_and_clear();
        }
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

async fn run_pdf_batch(
    config: &ScanConfig,
    extractor: Arc<TextExtractor>,
    pdfs: Vec<PathBuf>,
    workers: usize,
    timeout: Option<f64>,
) -> anyhow::Result<ExtractionOutcome> {
    let max_workers = if workers > 0 {
        Some(workers)
    } else {
        config.fixed_workers()
    };
    let per_file_timeout = match timeout {
        Some(secs) if secs > 0.0 => Some(std::time::Duration::from_secs_f64(secs)),
        Some(_) => None,
        None => config.per_file_timeout(),
    };

    let (tx, rx) = mpsc::channel(64);
    let printer = spawn_progress_printer(rx);
    let outcome =
        extract_pdfs_concurrently(pdfs, extractor, max_workers, per_file_timeout, Some(tx)).await;
    let _ = printer.await;
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn cmd_scan(
    config: &ScanConfig,
    paths: Vec<String>,
    out: &str,
    class_tags: Option<&str>,
    workers: usize,
    timeout: Option<f64>,
    open_failed: bool,
    no_cache: bool,
) -> anyhow::Result<()> {
    let roster_path = ScanConfig::expand_path(&config.student_roster_path);
    let roster = StudentDirectory::from_mapping(&load_student_roster(&roster_path));
    if roster.is_empty() {
        tracing::warn!("花名册为空，仅按班级关键词扫描");
    }
    let class_tags = resolve_class_tags(config, class_tags);

    let targets = if paths.is_empty() {
        config.scan_paths.clone()
    } else {
        paths
    };
    let files = collect_supported_paths(&targets);
    if files.is_empty() {
        println!("未找到可扫描的文件，支持 .docx .pdf .xlsx .xls .csv .txt");
        std::process::exit(4);
    }

    let extractor = Arc::new(build_extractor(config, no_cache));

    // PDFs go through the concurrent coordinator; everything else is a cheap
    // single-shot read done inline below.
    let pdfs: Vec<PathBuf> = files
        .iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    let outcome = run_pdf_batch(config, Arc::clone(&extractor), pdfs, workers, timeout).await?;

    let total = files.len();
    let mut all_rows: Vec<MatchRow> = Vec::new();
    let mut matched_files: Vec<PathBuf> = Vec::new();

    for (index, path) in files.iter().enumerate() {
        println!(
            "[{}/{}] 正在扫描: {}",
            index + 1,
            total,
            display_name(path)
        );
        let is_pdf = outcome.texts.contains_key(path) || outcome.errors.contains_key(path);
        let text = if is_pdf {
            match outcome.texts.get(path) {
                Some(text) => text.clone(),
                None => {
                    // In the error map only: timeout or worker crash.
                    let reason = outcome
                        .errors
                        .get(path)
                        .cloned()
                        .unwrap_or_else(|| "未知错误".to_string());
                    all_rows.push(MatchRow::status_row(
                        &path.to_string_lossy(),
                        &stem_of(path),
                        &format!("读取失败: {reason}"),
                    ));
                    continue;
                }
            }
        } else {
            match extractor.extract(path) {
                Ok(text) => text,
                Err(err) => {
                    all_rows.push(MatchRow::status_row(
                        &path.to_string_lossy(),
                        &stem_of(path),
                        &format!("读取失败: {err}"),
                    ));
                    continue;
                }
            }
        };

        let document =
            ScannableDocument::new(path, text, &config.default_activity_keywords);
        let rows = match catch_unwind(AssertUnwindSafe(|| {
            scan_document_for_matches(&document, &roster, &class_tags)
        })) {
            Ok(rows) => rows,
            Err(_) => {
                all_rows.push(MatchRow::status_row(
                    &document.path,
                    &document.activity,
                    "扫描异常",
                ));
                continue;
            }
        };

        if rows.iter().any(|r| r.status == STATUS_OK) {
            matched_files.push(path.clone());
        }
        if rows.is_empty() {
            all_rows.push(MatchRow::no_hit(&document.path, &document.activity));
        } else {
            all_rows.extend(rows);
        }
    }

    let tables = build_report_tables(&all_rows, &roster);
    let run_dir = create_run_dir(Path::new("scan_outputs"), out)?;
    export_report(&run_dir, &tables)?;

    let resolved_targets: Vec<PathBuf> = targets.iter().map(PathBuf::from).collect();
    copy_matched_sources(&run_dir, &matched_files, &resolved_targets);

    if !outcome.failed.is_empty() {
        println!(
            "{} 以下文件文本提取失败，建议手动检查:",
            style("!").yellow()
        );
        for path in &outcome.failed {
            println!("    {}", path.display());
        }
        if open_failed {
            open_for_review(&outcome.failed);
        }
    }

    println!(
        "{} 扫描完成：共处理 {} 个文件，命中 {} 个，提取失败 {} 个，结果已集中到 {}",
        style("✓").green(),
        total,
        matched_files.len(),
        outcome.failed.len(),
        run_dir.display()
    );
    Ok(())
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

async fn cmd_read_pdfs(
    config: &ScanConfig,
    paths: Vec<String>,
    workers: usize,
    timeout: Option<f64>,
) -> anyhow::Result<()> {
    let targets = if paths.is_empty() {
        config.scan_paths.clone()
    } else {
        paths
    };
    let pdfs = collect_pdf_paths(&targets);
    if pdfs.is_empty() {
        println!("未找到任何 PDF 文件。");
        return Ok(());
    }

    let total = pdfs.len();
    let extractor = Arc::new(build_extractor(config, false));
    let outcome = run_pdf_batch(config, extractor, pdfs, workers, timeout).await?;

    let error_details: serde_json::Map<String, serde_json::Value> = outcome
        .errors
        .iter()
        .map(|(path, err)| {
            (
                path.to_string_lossy().to_string(),
                serde_json::Value::String(err.clone()),
            )
        })
        .collect();
    let summary = serde_json::json!({
        "total": total,
        "success": outcome.success_count(),
        "errors": outcome.errors.len(),
        "error_details": error_details,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_ocr_check(config: &ScanConfig) -> anyhow::Result<()> {
    let extractor = build_extractor(config, true);
    for status in extractor.check_tools() {
        let mark = if status.available {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!("  {} {:<12} {}", mark, status.name, status.hint);
    }
    Ok(())
}

fn cmd_calibrate(cap: Option<usize>) -> anyhow::Result<()> {
    println!("{} 正在标定工作线程数…", style("→").cyan());
    let workers = calibrate_pdf_workers(cap, None);
    println!("{} 推荐工作线程数: {}", style("✓").green(), workers);
    Ok(())
}

/// Open extraction-failed files with the platform opener for manual review.
fn open_for_review<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) {
    for path in paths {
        #[cfg(target_os = "macos")]
        let result = ProcessCommand::new("open").arg(path).spawn();
        #[cfg(target_os = "windows")]
        let result = ProcessCommand::new("cmd")
            .args(["/C", "start", ""])
            .arg(path)
            .spawn();
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let result = ProcessCommand::new("xdg-open").arg(path).spawn();

        if let Err(err) = result {
            tracing::warn!("无法打开 {}: {}", path.display(), err);
        }
    }
}
