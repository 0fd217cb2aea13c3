//! Worker-count calibration for CPU-bound PDF extraction.
//!
//! Rendering and OCR inference scale with physical cores, not with any fixed
//! constant, so instead of hardcoding a pool size we benchmark a few
//! candidates around the host's core count and keep the fastest. Operators
//! can bypass measurement entirely with an environment override.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use sha2::{Digest, Sha256};

/// Environment overrides, checked in order.
const ENV_OVERRIDES: [&str; 2] = ["ROLLSCAN_PDF_WORKERS", "ROLLSCAN_OCR_WORKERS"];

/// Batches smaller than this skip benchmarking; spinning up measurement
/// threads costs more than it saves on a handful of files.
pub const CALIBRATION_MIN_BATCH: usize = 4;

const PROBE_BUF_BYTES: usize = 256 * 1024;
const PROBE_LOOPS: usize = 48;

/// One chunk of deterministic CPU work approximating OCR intensity.
///
/// The buffer content is fixed (simple LCG stream) and one byte is flipped
/// per loop, so timing differences between candidates reflect scheduling
/// overhead rather than data variance.
fn cpu_probe_work() -> u64 {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut buf = vec![0u8; PROBE_BUF_BYTES];
    for byte in buf.iter_mut() {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        *byte = (state >> 56) as u8;
    }

    let mut acc: u64 = 0;
    for i in 0..PROBE_LOOPS {
        let idx = (i.wrapping_mul(2_654_435_761)) % PROBE_BUF_BYTES;
        buf[idx] ^= (i & 0xFF) as u8;
        let digest = Sha256::digest(&buf);
        acc ^= digest
            .iter()
            .take(8)
            .fold(0u64, |folded, byte| (folded << 8) | u64::from(*byte));
    }
    acc
}

/// Aggregate throughput (tasks per second) for one candidate pool size.
/// `None` means the measurement itself failed.
fn bench_workers_once(workers: usize) -> Option<f64> {
    if workers == 0 {
        return None;
    }
    let tasks = (workers * 2).max(4);

    let bench = || {
        let sink = AtomicU64::new(0);
        let started = Instant::now();
        std::thread::scope(|scope| {
            for worker in 0..workers {
                let share = tasks / workers + usize::from(worker < tasks % workers);
                let sink = &sink;
                scope.spawn(move || {
                    for _ in 0..share {
                        sink.fetch_xor(cpu_probe_work(), Ordering::Relaxed);
                    }
                });
            }
        });
        let elapsed = started.elapsed().as_secs_f64().max(1e-6);
        // Keep the sink observable so the probe work is not optimized out.
        let _ = sink.load(Ordering::Relaxed);
        tasks as f64 / elapsed
    };

    catch_unwind(AssertUnwindSafe(bench)).ok()
}

fn logical_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn env_override() -> Option<usize> {
    for var in ENV_OVERRIDES {
        if let Ok(raw) = std::env::var(var) {
            if let Ok(value) = raw.trim().parse::<usize>() {
                if value > 0 {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Candidate pool sizes near the core count, deduplicated and clamped.
fn candidate_pool(cores: usize, cap: usize) -> Vec<usize> {
    let mut candidates = vec![
        1,
        (cores / 2).max(1),
        cores,
        ((cores * 3).div_ceil(2)).min(cap),
    ];
    candidates.iter_mut().for_each(|c| *c = (*c).clamp(1, cap));
    candidates.sort_unstable();
    candidates.dedup();
    candidates
}

/// Heuristically determine a good worker count for PDF extraction.
///
/// Strategy:
/// - Respect explicit overrides via `ROLLSCAN_PDF_WORKERS` / `ROLLSCAN_OCR_WORKERS`.
/// - Skip measurement for tiny batches and fall back to a core-count heuristic.
/// - Otherwise benchmark candidates around the core count (½×, 1×, 1.5×) and
///   pick the best; a candidate whose measurement fails scores zero.
///
/// Always returns at least 1.
pub fn calibrate_pdf_workers(max_cap: Option<usize>, batch_hint: Option<usize>) -> usize {
    if let Some(value) = env_override() {
        return value.max(1);
    }

    let cores = logical_cores();
    let cap = match max_cap {
        Some(cap) if cap > 0 => cap,
        _ => (cores * 2).clamp(4, 24),
    };

    if let Some(batch) = batch_hint {
        if batch < CALIBRATION_MIN_BATCH {
            let heuristic = (cores / 2).max(1).min(cap);
            return heuristic.min(batch.max(1));
        }
    }

    let mut best_workers = cores.clamp(1, cap);
    let mut best_score = -1.0_f64;
    for candidate in candidate_pool(cores, cap) {
        let score = bench_workers_once(candidate).unwrap_or(0.0);
        tracing::debug!("标定候选 {} 进程: {:.2} 任务/秒", candidate, score);
        if score > best_score {
            best_score = score;
            best_workers = candidate;
        }
    }

    best_workers.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // calibrate_pdf_workers reads process-wide env vars; tests touching it
    // serialize so the override test cannot bleed into the others.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_probe_work_is_deterministic() {
        assert_eq!(cpu_probe_work(), cpu_probe_work());
    }

    #[test]
    fn test_bench_zero_workers_fails() {
        assert!(bench_workers_once(0).is_none());
    }

    #[test]
    fn test_bench_single_worker_scores() {
        let score = bench_workers_once(1).unwrap();
        assert!(score > 0.0);
    }

    #[test]
    fn test_candidate_pool_clamped_and_deduped() {
        let pool = candidate_pool(8, 6);
        assert!(pool.windows(2).all(|w| w[0] < w[1]));
        assert!(pool.iter().all(|&c| (1..=6).contains(&c)));
        assert!(pool.contains(&1));
    }

    #[test]
    fn test_candidate_pool_single_core() {
        assert_eq!(candidate_pool(1, 4), vec![1]);
    }

    #[test]
    fn test_small_batch_uses_heuristic() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("ROLLSCAN_PDF_WORKERS");
        std::env::remove_var("ROLLSCAN_OCR_WORKERS");
        // A one-file batch never benchmarks and never exceeds the batch size.
        let workers = calibrate_pdf_workers(Some(8), Some(1));
        assert_eq!(workers, 1);
    }

    #[test]
    fn test_env_override_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ROLLSCAN_PDF_WORKERS", "3");
        let workers = calibrate_pdf_workers(None, Some(100));
        std::env::remove_var("ROLLSCAN_PDF_WORKERS");
        assert_eq!(workers, 3);
    }

    #[test]
    fn test_nonsense_override_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ROLLSCAN_PDF_WORKERS", "-2");
        // Falls through to the small-batch heuristic instead of the override.
        let workers = calibrate_pdf_workers(Some(8), Some(1));
        std::env::remove_var("ROLLSCAN_PDF_WORKERS");
        assert_eq!(workers, 1);
    }

    #[test]
    fn test_returns_at_least_one() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("ROLLSCAN_PDF_WORKERS");
        std::env::remove_var("ROLLSCAN_OCR_WORKERS");
        let workers = calibrate_pdf_workers(Some(1), Some(2));
        assert!(workers >= 1);
    }
}
