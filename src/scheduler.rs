use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context};
use crossbeam_queue::ArrayQueue;
use tracing::{debug, info};

use crate::encoder::Encoder;
use crate::progress::ProgressTracker;
use crate::task::{self, ConversionOutcome, ConversionRequest, SourceFile};

/// Everything the worker pool did with a set of requests.
#[derive(Debug, Default)]
pub struct Dispatch {
    pub outcomes: Vec<ConversionOutcome>,
    /// Requests never started because dispatch was cancelled.
    pub skipped: Vec<SourceFile>,
    pub workers: usize,
}

/// Never more workers than items, never fewer than one.
#[must_use]
pub fn effective_concurrency(requested: usize, items: usize) -> usize {
    requested.min(items).max(1)
}

/// Runs every request on at most `concurrency` worker threads.
///
/// Workers check `cancel` before taking the next request, so a cancelled run
/// finishes the conversions already in flight and leaves the rest untouched.
pub fn run_all(
    encoder: &dyn Encoder,
    requests: Vec<ConversionRequest>,
    concurrency: usize,
    progress: &ProgressTracker,
    cancel: &AtomicBool,
) -> anyhow::Result<Dispatch> {
    if concurrency == 0 {
        return Err(anyhow!("At least one worker is required"));
    }

    let total = requests.len();

    if total == 0 {
        return Ok(Dispatch::default());
    }

    let workers = effective_concurrency(concurrency, total);

    let request_queue: ArrayQueue<ConversionRequest> = ArrayQueue::new(total);
    let result_queue: ArrayQueue<ConversionOutcome> = ArrayQueue::new(total);

    for request in requests {
        if request_queue.push(request).is_err() {
            return Err(anyhow!("Conversion request queue was unexpectedly full"));
        }
    }

    info!("Converting {total} files with {workers} workers");

    std::thread::scope(|scope| -> anyhow::Result<()> {
        let threads = (0..workers)
            .map(|worker_index| {
                let request_queue = &request_queue;
                let result_queue = &result_queue;

                std::thread::Builder::new()
                    .name(format!("transcode-{worker_index}"))
                    .spawn_scoped(scope, move || -> anyhow::Result<()> {
                        while !cancel.load(Ordering::Acquire) {
                            let Some(request) = request_queue.pop() else {
                                break;
                            };

                            let outcome = task::run(encoder, &request, progress)
                                .with_context(|| {
                                    format!("Unable to record outcome for {}", request.source())
                                })?;

                            if result_queue.push(outcome).is_err() {
                                return Err(anyhow!("Conversion result queue was unexpectedly full"));
                            }
                        }

                        debug!("Worker {worker_index} finished");

                        Ok(())
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .context("Unable to spawn transcoding workers")?;

        for thread in threads {
            match thread.join() {
                Ok(result) => {
                    result.context("Transcoding worker failed")?;
                }
                Err(error) => {
                    return Err(anyhow!("Transcoding worker panicked: {:?}", error));
                }
            }
        }

        Ok(())
    })
    .context("Unable to execute transcoding workers")?;

    let mut dispatch = Dispatch {
        outcomes: Vec::with_capacity(total),
        skipped: vec![],
        workers,
    };

    while let Some(outcome) = result_queue.pop() {
        dispatch.outcomes.push(outcome);
    }

    while let Some(request) = request_queue.pop() {
        dispatch.skipped.push(request.into_source());
    }

    if dispatch.outcomes.len() + dispatch.skipped.len() != total {
        return Err(anyhow!(
            "BUG: {} requests went in but {} outcomes and {} skipped came out",
            total,
            dispatch.outcomes.len(),
            dispatch.skipped.len()
        ));
    }

    Ok(dispatch)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::task::testing::{Behavior, FakeEncoder};

    fn requests(dir: &Path, count: usize) -> Vec<ConversionRequest> {
        (0..count)
            .map(|index| {
                let path = dir.join(format!("track-{index:02}.flac"));
                std::fs::write(&path, b"fLaC").unwrap();
                ConversionRequest::new(SourceFile::new(path, Some(4)), 128, "opus")
            })
            .collect()
    }

    #[test]
    fn test_effective_concurrency_is_bounded_by_items() {
        assert_eq!(effective_concurrency(8, 3), 3);
        assert_eq!(effective_concurrency(2, 3), 2);
        assert_eq!(effective_concurrency(4, 0), 1);
    }

    #[test]
    fn test_every_request_yields_exactly_one_outcome() {
        for (count, concurrency) in [(1, 1), (5, 2), (12, 4), (7, 7)] {
            let dir = tempfile::tempdir().unwrap();
            let progress = ProgressTracker::hidden(count);
            let cancel = AtomicBool::new(false);

            let dispatch = run_all(
                &FakeEncoder::new(),
                requests(dir.path(), count),
                concurrency,
                &progress,
                &cancel,
            )
            .unwrap();

            let sources = dispatch
                .outcomes
                .iter()
                .map(|outcome| outcome.source().path().to_path_buf())
                .collect::<HashSet<_>>();

            assert_eq!(dispatch.outcomes.len(), count);
            assert_eq!(sources.len(), count);
            assert!(dispatch.skipped.is_empty());
            assert!(progress.snapshot().is_finished());
        }
    }

    #[test]
    fn test_in_flight_tasks_never_exceed_workers() {
        let dir = tempfile::tempdir().unwrap();
        let progress = ProgressTracker::hidden(3);
        let cancel = AtomicBool::new(false);
        let encoder = FakeEncoder::new().delay(Duration::from_millis(50));

        let dispatch = run_all(&encoder, requests(dir.path(), 3), 8, &progress, &cancel).unwrap();

        assert_eq!(dispatch.workers, 3);
        assert!(encoder.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_failures_do_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let progress = ProgressTracker::hidden(4);
        let cancel = AtomicBool::new(false);
        let encoder = FakeEncoder::new().failing(&["track-01", "track-03"], Behavior::Fail);

        let dispatch = run_all(&encoder, requests(dir.path(), 4), 2, &progress, &cancel).unwrap();

        let succeeded = dispatch
            .outcomes
            .iter()
            .filter(|outcome| outcome.is_success())
            .count();

        assert_eq!(dispatch.outcomes.len(), 4);
        assert_eq!(succeeded, 2);
        assert_eq!(progress.snapshot().failed, 2);
    }

    #[test]
    fn test_cancel_stops_new_dispatch_only() {
        let dir = tempfile::tempdir().unwrap();
        let progress = ProgressTracker::hidden(3);
        let cancel = Arc::new(AtomicBool::new(false));
        let encoder = FakeEncoder::new().cancel_after_first(Arc::clone(&cancel));

        let dispatch = run_all(&encoder, requests(dir.path(), 3), 1, &progress, &cancel).unwrap();

        assert_eq!(dispatch.outcomes.len(), 1);
        assert_eq!(dispatch.skipped.len(), 2);
        assert!(dispatch.outcomes.iter().all(ConversionOutcome::is_success));

        for source in &dispatch.skipped {
            assert!(source.path().exists());
        }
    }

    #[test]
    fn test_pre_cancelled_run_dispatches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let progress = ProgressTracker::hidden(2);
        let cancel = AtomicBool::new(true);
        let encoder = FakeEncoder::new();

        let dispatch = run_all(&encoder, requests(dir.path(), 2), 2, &progress, &cancel).unwrap();

        assert!(dispatch.outcomes.is_empty());
        assert_eq!(dispatch.skipped.len(), 2);
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_input_returns_immediately() {
        let progress = ProgressTracker::hidden(0);
        let cancel = AtomicBool::new(false);

        let dispatch = run_all(&FakeEncoder::new(), vec![], 4, &progress, &cancel).unwrap();

        assert!(dispatch.outcomes.is_empty());
        assert_eq!(dispatch.workers, 0);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let progress = ProgressTracker::hidden(0);
        let cancel = AtomicBool::new(false);

        assert!(run_all(&FakeEncoder::new(), vec![], 0, &progress, &cancel).is_err());
    }
}
