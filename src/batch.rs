use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::encoder::Encoder;
use crate::error::{BatchError, FailureReason};
use crate::progress::ProgressTracker;
use crate::scheduler::{self, effective_concurrency};
use crate::task::{ConversionOutcome, ConversionRequest, SourceFile};
use crate::util::{create_progress_bar, verify_directory};

pub const SOURCE_EXTENSION: &str = "flac";
pub const DEFAULT_BITRATE: u32 = 192;

#[derive(Clone, Debug)]
pub struct BatchSettings {
    pub bitrate_kbps: u32,
    pub concurrency: usize,
    pub source_extension: String,
    pub show_progress: bool,
    pub use_color: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            bitrate_kbps: DEFAULT_BITRATE,
            concurrency: 1,
            source_extension: SOURCE_EXTENSION.to_owned(),
            show_progress: false,
            use_color: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub path: PathBuf,
    pub reason: FailureReason,
}

/// Final account of one batch run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub workers: usize,
    pub cancelled: bool,
    /// Combined size of the sources that were replaced.
    pub input_bytes: u64,
    /// Combined size of the outputs that replaced them.
    pub output_bytes: u64,
    pub failures: Vec<FailureEntry>,
    pub skipped: Vec<PathBuf>,
}

impl BatchReport {
    fn from_outcomes(
        total: usize,
        workers: usize,
        outcomes: Vec<ConversionOutcome>,
        skipped: Vec<SourceFile>,
        cancelled: bool,
    ) -> Self {
        let mut report = Self {
            total,
            workers,
            cancelled: cancelled || !skipped.is_empty(),
            ..Self::default()
        };

        for outcome in outcomes {
            match outcome {
                ConversionOutcome::Success {
                    source,
                    output_size,
                    ..
                } => {
                    report.succeeded += 1;
                    report.input_bytes += source.size().unwrap_or(0);
                    report.output_bytes += output_size;
                }
                ConversionOutcome::Failure { source, reason } => {
                    report.failed += 1;
                    report.failures.push(FailureEntry {
                        path: source.path().to_path_buf(),
                        reason,
                    });
                }
            }
        }

        report.failures.sort_by(|a, b| a.path.cmp(&b.path));

        report.skipped = skipped
            .into_iter()
            .map(|source| source.path().to_path_buf())
            .collect();
        report.skipped.sort();

        report
    }

    #[must_use]
    pub const fn completed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Lists every regular file below `directory` whose extension matches,
/// ignoring case, sorted by path.
pub fn discover(directory: &Path, extension: &str) -> Result<Vec<SourceFile>, BatchError> {
    let mut files = vec![];

    for entry in WalkDir::new(directory).follow_links(false) {
        let entry = entry?;

        if !entry.file_type().is_file() {
            continue;
        }

        let matches = entry
            .path()
            .extension()
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(extension));

        if matches {
            let size = entry.metadata().ok().map(|metadata| metadata.len());
            files.push(SourceFile::new(entry.into_path(), size));
        }
    }

    files.sort();

    Ok(files)
}

/// Keeps the first request for every output path and fails the rest.
///
/// `a.flac` and `a.FLAC` both map to `a.opus`; converting both would leave a
/// single output for two deleted sources.
fn claim_outputs(
    requests: Vec<ConversionRequest>,
) -> (Vec<ConversionRequest>, Vec<ConversionOutcome>) {
    let mut claimed = HashSet::with_capacity(requests.len());
    let mut unique = Vec::with_capacity(requests.len());
    let mut collisions = vec![];

    for request in requests {
        if claimed.insert(request.output().to_path_buf()) {
            unique.push(request);
        } else {
            let path = request.output().to_path_buf();

            collisions.push(ConversionOutcome::Failure {
                source: request.into_source(),
                reason: FailureReason::OutputCollision { path },
            });
        }
    }

    (unique, collisions)
}

/// Converts every matching file below `directory` and reports the results.
///
/// Finding no matching files is reported as [`BatchError::NoInputFiles`]
/// before any worker starts.
pub fn run(
    directory: &Path,
    settings: &BatchSettings,
    encoder: &dyn Encoder,
    cancel: &AtomicBool,
) -> Result<BatchReport, BatchError> {
    if settings.bitrate_kbps == 0 {
        return Err(BatchError::InvalidBitrate {
            bitrate: settings.bitrate_kbps,
        });
    }

    if settings.concurrency == 0 {
        return Err(BatchError::InvalidConcurrency);
    }

    verify_directory(directory)?;

    let files = discover(directory, &settings.source_extension)?;

    if files.is_empty() {
        return Err(BatchError::NoInputFiles {
            directory: directory.to_path_buf(),
        });
    }

    let total = files.len();

    info!(
        "Found {total} {} files in {directory:?}, converting with {} at {} kbps",
        settings.source_extension,
        encoder.name(),
        settings.bitrate_kbps
    );

    let (requests, collisions) = claim_outputs(
        files
            .into_iter()
            .map(|source| {
                ConversionRequest::new(source, settings.bitrate_kbps, encoder.extension())
            })
            .collect(),
    );

    let workers = effective_concurrency(settings.concurrency, requests.len());

    let progress_bar = if settings.show_progress {
        create_progress_bar(workers, settings.use_color)?
    } else {
        ProgressBar::hidden()
    };

    let progress = ProgressTracker::init(total, progress_bar);

    for collision in &collisions {
        if let ConversionOutcome::Failure { source, reason } = collision {
            warn!("Not converting {source}: {reason}");
        }

        progress.record_completion(false)?;
    }

    progress.render();

    let mut dispatch = scheduler::run_all(encoder, requests, workers, &progress, cancel)?;

    progress.finish();
    debug!("Final progress: {}", progress.snapshot());

    dispatch.outcomes.extend(collisions);

    Ok(BatchReport::from_outcomes(
        total,
        dispatch.workers,
        dispatch.outcomes,
        dispatch.skipped,
        cancel.load(Ordering::Acquire),
    ))
}
