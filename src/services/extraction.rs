//! Concurrent PDF extraction coordinator.
//!
//! Fans a batch of PDF paths out across a bounded pool of blocking workers,
//! applies a per-task timeout, and collects a text-or-error result for every
//! path. Results arrive in completion order; callers needing stable output
//! sort by path afterwards.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::ocr::{ExtractionError, TextExtractor};

use super::calibrate;

/// Progress events for the CLI layer.
#[derive(Debug, Clone)]
pub enum ExtractionEvent {
    BatchStarted { total: usize, workers: usize },
    FileStarted { path: PathBuf },
    FileCompleted { path: PathBuf, chars: usize },
    FileFailed { path: PathBuf, error: String },
}

/// Everything a batch produced. A path may carry both text and an error
/// (empty text still records the reason); the `failed` set holds paths for
/// which no strategy produced usable text, for manual follow-up.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub texts: HashMap<PathBuf, String>,
    pub errors: HashMap<PathBuf, String>,
    pub failed: BTreeSet<PathBuf>,
}

impl ExtractionOutcome {
    /// Count of paths that produced non-blank text.
    pub fn success_count(&self) -> usize {
        self.texts.values().filter(|t| !t.trim().is_empty()).count()
    }
}

enum TaskOutcome {
    Finished(Result<String, ExtractionError>),
    TimedOut(Duration),
    Crashed(String),
}

/// Extract text for many PDFs concurrently.
///
/// The worker count comes from the calibrator unless `max_workers` is given.
/// Only a host with no viable extraction strategy at all aborts the batch;
/// every per-file failure is converted into map entries instead.
pub async fn extract_pdfs_concurrently(
    paths: Vec<PathBuf>,
    extractor: Arc<TextExtractor>,
    max_workers: Option<usize>,
    per_file_timeout: Option<Duration>,
    event_tx: Option<mpsc::Sender<ExtractionEvent>>,
) -> anyhow::Result<ExtractionOutcome> {
    let mut outcome = ExtractionOutcome::default();
    if paths.is_empty() {
        return Ok(outcome);
    }

    let workers = match max_workers {
        Some(n) if n > 0 => n,
        _ => calibrate::calibrate_pdf_workers(None, Some(paths.len())),
    };
    tracing::info!("并发提取 {} 份 PDF（{} 个工作线程）", paths.len(), workers);
    send_event(
        &event_tx,
        ExtractionEvent::BatchStarted {
            total: paths.len(),
            workers,
        },
    )
    .await;

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut join_set: JoinSet<(PathBuf, TaskOutcome)> = JoinSet::new();

    for path in paths {
        let semaphore = Arc::clone(&semaphore);
        let extractor = Arc::clone(&extractor);
        let event_tx = event_tx.clone();
        join_set.spawn(async move {
            // Closed only when the JoinSet is dropped mid-run.
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (path, TaskOutcome::Crashed("worker pool closed".to_string()));
            };
            send_event(&event_tx, ExtractionEvent::FileStarted { path: path.clone() }).await;

            let task_path = path.clone();
            let handle = tokio::task::spawn_blocking(move || extractor.extract_pdf(&task_path));

            let result = match per_file_timeout {
                Some(limit) => match tokio::time::timeout(limit, handle).await {
                    Ok(joined) => joined.map(TaskOutcome::Finished).unwrap_or_else(|err| {
                        TaskOutcome::Crashed(err.to_string())
                    }),
                    Err(_) => TaskOutcome::TimedOut(limit),
                },
                None => match handle.await {
                    Ok(finished) => TaskOutcome::Finished(finished),
                    Err(err) => TaskOutcome::Crashed(err.to_string()),
                },
            };
            (path, result)
        });
    }

    // Drain in completion order; a failed or timed-out task never blocks the
    // rest of the batch.
    while let Some(joined) = join_set.join_next().await {
        let (path, task_outcome) = match joined {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!("提取任务意外终止: {}", err);
                continue;
            }
        };

        match task_outcome {
            TaskOutcome::Finished(Ok(text)) => {
                if text.trim().is_empty() {
                    let reason = "提取文本为空".to_string();
                    send_event(
                        &event_tx,
                        ExtractionEvent::FileFailed {
                            path: path.clone(),
                            error: reason.clone(),
                        },
                    )
                    .await;
                    outcome.errors.insert(path.clone(), reason);
                    outcome.failed.insert(path.clone());
                } else {
                    send_event(
                        &event_tx,
                        ExtractionEvent::FileCompleted {
                            path: path.clone(),
                            chars: text.chars().count(),
                        },
                    )
                    .await;
                }
                // Text is recorded even when empty; downstream consumers can
                // still flag the file without excluding it elsewhere.
                outcome.texts.insert(path, text);
            }
            TaskOutcome::Finished(Err(ExtractionError::NoStrategyAvailable(hint))) => {
                join_set.abort_all();
                anyhow::bail!("缺少提取依赖，批次中止: {}", hint);
            }
            TaskOutcome::Finished(Err(err)) => {
                let reason = err.to_string();
                send_event(
                    &event_tx,
                    ExtractionEvent::FileFailed {
                        path: path.clone(),
                        error: reason.clone(),
                    },
                )
                .await;
                outcome.errors.insert(path.clone(), reason);
                outcome.failed.insert(path);
            }
            TaskOutcome::TimedOut(limit) => {
                let reason = format!("任务超时（{} 秒）", limit.as_secs());
                send_event(
                    &event_tx,
                    ExtractionEvent::FileFailed {
                        path: path.clone(),
                        error: reason.clone(),
                    },
                )
                .await;
                outcome.errors.insert(path, reason);
            }
            TaskOutcome::Crashed(detail) => {
                let reason = format!("工作线程崩溃: {}", detail);
                send_event(
                    &event_tx,
                    ExtractionEvent::FileFailed {
                        path: path.clone(),
                        error: reason.clone(),
                    },
                )
                .await;
                outcome.errors.insert(path, reason);
            }
        }
    }

    Ok(outcome)
}

async fn send_event(tx: &Option<mpsc::Sender<ExtractionEvent>>, event: ExtractionEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{PdfSettings, TextCache};

    fn extractor() -> Arc<TextExtractor> {
        Arc::new(TextExtractor::new(
            PdfSettings::default(),
            Default::default(),
        ))
    }

    #[tokio::test]
    async fn test_empty_input_returns_empty_maps() {
        let outcome = extract_pdfs_concurrently(Vec::new(), extractor(), Some(4), None, None)
            .await
            .unwrap();
        assert!(outcome.texts.is_empty());
        assert!(outcome.errors.is_empty());
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn test_every_path_lands_in_a_map() {
        if !crate::ocr::check_binary("pdftotext") {
            // Chain viability depends on host tools; nothing to assert here.
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let corrupt = dir.path().join("corrupt.pdf");
        std::fs::write(&corrupt, b"%PDF-1.4 truncated garbage").unwrap();

        let outcome = extract_pdfs_concurrently(
            vec![corrupt.clone()],
            extractor(),
            Some(2),
            Some(Duration::from_secs(120)),
            None,
        )
        .await
        .unwrap();

        let in_texts = outcome.texts.contains_key(&corrupt);
        let in_errors = outcome.errors.contains_key(&corrupt);
        assert!(in_texts || in_errors, "path absent from both maps");
    }

    #[tokio::test]
    async fn test_events_cover_batch() {
        let (tx, mut rx) = mpsc::channel(16);
        let _ = extract_pdfs_concurrently(Vec::new(), extractor(), Some(1), None, Some(tx)).await;
        // Empty input emits nothing, not even BatchStarted.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cache_type_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TextCache>();
        assert_send_sync::<TextExtractor>();
    }
}
