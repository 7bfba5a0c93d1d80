//! Many-file conversion with a bounded number of conversions in flight.

use crate::converter::Converter;
use crate::engines::ConvertOptions;
use crate::error::ConversionFailed;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on default concurrency; the work is dominated by tool
/// start-up and I/O.
pub const MAX_DEFAULT_WORKERS: usize = 4;

/// Result for one input of a batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub input: PathBuf,
    pub result: Result<PathBuf, ConversionFailed>,
}

impl BatchOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Smaller of the machine's parallelism and [`MAX_DEFAULT_WORKERS`].
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

/// Convert every file, at most `workers` at a time. A failure is recorded
/// in its outcome and never stops the rest of the batch.
///
/// Outcomes arrive in completion order; with `workers == 1` that is input order.
pub async fn convert_all(
    converter: &Converter,
    files: &[PathBuf],
    target: &str,
    output_dir: &Path,
    options: &ConvertOptions,
    workers: usize,
) -> Vec<BatchOutcome> {
    convert_all_with_progress(converter, files, target, output_dir, options, workers, |_, _, _| {}).await
}

/// Like [`convert_all`], calling `progress(done, total, outcome)` as each
/// file finishes.
pub async fn convert_all_with_progress<F>(
    converter: &Converter,
    files: &[PathBuf],
    target: &str,
    output_dir: &Path,
    options: &ConvertOptions,
    workers: usize,
    mut progress: F,
) -> Vec<BatchOutcome>
where
    F: FnMut(usize, usize, &BatchOutcome),
{
    let total = files.len();
    let workers = workers.max(1);
    info!("Converting {} files to {} with {} workers", total, target, workers);

    let mut pending = stream::iter(files.iter().cloned())
        .map(move |input| async move {
            let result = converter.convert(&input, target, output_dir, options).await;
            BatchOutcome { input, result }
        })
        .buffer_unordered(workers);

    let mut outcomes = Vec::with_capacity(total);
    while let Some(outcome) = pending.next().await {
        if let Err(err) = &outcome.result {
            warn!("{}: {}", outcome.input.display(), err);
        }
        outcomes.push(outcome);
        progress(outcomes.len(), total, &outcomes[outcomes.len() - 1]);
    }

    let failed = outcomes.iter().filter(|o| !o.success()).count();
    info!("Batch finished: {} converted, {} failed", total - failed, failed);
    outcomes
}

/// Rough wall-clock estimate for a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeEstimate {
    pub sequential: Duration,
    pub parallel: Duration,
    pub workers: usize,
}

pub fn estimate(file_count: usize, per_file: Duration, workers: usize) -> TimeEstimate {
    let workers = workers.max(1);
    let sequential = per_file * file_count as u32;
    TimeEstimate {
        sequential,
        parallel: sequential / workers as u32,
        workers,
    }
}
