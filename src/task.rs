use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::encoder::Encoder;
use crate::error::FailureReason;
use crate::progress::ProgressTracker;

/// One discovered input file.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SourceFile {
    path: PathBuf,
    size: Option<u64>,
}

impl SourceFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn size(&self) -> Option<u64> {
        self.size
    }
}

impl std::fmt::Display for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// A source file paired with everything needed to convert it.
#[derive(Clone, Debug)]
pub struct ConversionRequest {
    source: SourceFile,
    bitrate_kbps: u32,
    output: PathBuf,
}

impl ConversionRequest {
    /// The output sits next to the source with the same stem and `extension`.
    #[must_use]
    pub fn new(source: SourceFile, bitrate_kbps: u32, extension: &str) -> Self {
        let output = source.path().with_extension(extension);

        Self {
            source,
            bitrate_kbps,
            output,
        }
    }

    #[must_use]
    pub const fn source(&self) -> &SourceFile {
        &self.source
    }

    #[must_use]
    pub const fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }

    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    #[must_use]
    pub fn into_source(self) -> SourceFile {
        self.source
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Success {
        source: SourceFile,
        output: PathBuf,
        output_size: u64,
    },
    Failure {
        source: SourceFile,
        reason: FailureReason,
    },
}

impl ConversionOutcome {
    #[must_use]
    pub const fn source(&self) -> &SourceFile {
        match self {
            Self::Success { source, .. } | Self::Failure { source, .. } => source,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Converts one file end to end and records the result with `progress`.
///
/// The source is removed only after the encoder reported success and the
/// output was confirmed to be a non-empty regular file. Per-file problems
/// become a `Failure` outcome; the only error returned is a progress
/// invariant violation.
pub fn run(
    encoder: &dyn Encoder,
    request: &ConversionRequest,
    progress: &ProgressTracker,
) -> anyhow::Result<ConversionOutcome> {
    debug!("Converting {}", request.source());

    let outcome = convert(encoder, request);

    match &outcome {
        ConversionOutcome::Success { output, .. } => {
            debug!("Replaced {} with {output:?}", request.source());
        }
        ConversionOutcome::Failure { source, reason } => {
            warn!("Unable to convert {source}: {reason}");

            if let Some(diagnostics) = reason.diagnostics() {
                debug!("{} output for {source}:\n{diagnostics}", encoder.name());
            }
        }
    }

    progress.record_completion(outcome.is_success())?;

    Ok(outcome)
}

fn convert(encoder: &dyn Encoder, request: &ConversionRequest) -> ConversionOutcome {
    let source = request.source().clone();
    let output = request.output();

    if let Err(error) = encoder.encode(source.path(), output, request.bitrate_kbps()) {
        let reason = FailureReason::from(error);

        // Pre-check failures never started the encoder, so whatever sits at
        // `output` belongs to someone else.
        if reason.encoder_started() {
            discard_output(output);
        }

        return ConversionOutcome::Failure { source, reason };
    }

    let output_size = match verify_output(output) {
        Ok(size) => size,
        Err(detail) => {
            discard_output(output);

            return ConversionOutcome::Failure {
                source,
                reason: FailureReason::OutputVerification { detail },
            };
        }
    };

    if let Err(error) = std::fs::remove_file(source.path()) {
        return ConversionOutcome::Failure {
            source,
            reason: FailureReason::SourceRemoval {
                detail: error.to_string(),
            },
        };
    }

    ConversionOutcome::Success {
        source,
        output: output.to_path_buf(),
        output_size,
    }
}

fn verify_output(output: &Path) -> Result<u64, String> {
    let metadata = std::fs::metadata(output)
        .map_err(|error| format!("output {output:?} is not readable: {error}"))?;

    if !metadata.is_file() {
        return Err(format!("output {output:?} is not a regular file"));
    }

    if metadata.len() == 0 {
        return Err(format!("output {output:?} is empty"));
    }

    Ok(metadata.len())
}

fn discard_output(output: &Path) {
    if !output.exists() {
        return;
    }

    if let Err(error) = std::fs::remove_file(output) {
        warn!("Unable to remove untrusted output {output:?}: {error}");
    }
}
