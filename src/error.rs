use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors reported by a single encoder invocation.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Input file not found: {path:?}")]
    InputNotFound { path: PathBuf },

    #[error("Invalid bitrate {bitrate} kbps")]
    InvalidBitrate { bitrate: u32 },

    #[error("Output file already exists: {path:?}")]
    OutputExists { path: PathBuf },

    #[error("Unable to launch encoder {program:?}")]
    EncoderNotFound {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder exited with {}", describe_code(.code))]
    EncoderFailed {
        code: Option<i32>,
        diagnostics: String,
    },
}

/// Why one file was not safely replaced.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("EncoderNotFound: {program}: {detail}")]
    EncoderNotFound { program: String, detail: String },

    #[error("EncoderFailed: exited with {}", describe_code(.code))]
    EncoderFailed {
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("InvalidRequest: {detail}")]
    InvalidRequest { detail: String },

    #[error("OutputExists: {path:?} was left untouched")]
    OutputExists { path: PathBuf },

    #[error("OutputCollision: {path:?} is also the output of another source file")]
    OutputCollision { path: PathBuf },

    #[error("OutputVerification: {detail}")]
    OutputVerification { detail: String },

    #[error("SourceRemoval: source removal failed: {detail}")]
    SourceRemoval { detail: String },
}

impl FailureReason {
    /// Whether the encoder was launched, so anything at the output path came
    /// from this run.
    #[must_use]
    pub const fn encoder_started(&self) -> bool {
        matches!(
            self,
            Self::EncoderFailed { .. } | Self::EncoderNotFound { .. }
        )
    }

    /// Captured encoder output, when the failure came from the encoder itself.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::EncoderFailed { diagnostics, .. } if !diagnostics.is_empty() => {
                Some(diagnostics.as_str())
            }
            _ => None,
        }
    }
}

impl From<EncodeError> for FailureReason {
    fn from(error: EncodeError) -> Self {
        match error {
            EncodeError::InputNotFound { path } => Self::InvalidRequest {
                detail: format!("input file {path:?} does not exist"),
            },
            EncodeError::InvalidBitrate { bitrate } => Self::InvalidRequest {
                detail: format!("bitrate {bitrate} kbps is not positive"),
            },
            EncodeError::OutputExists { path } => Self::OutputExists { path },
            EncodeError::EncoderNotFound { program, source } => Self::EncoderNotFound {
                program: program.to_string_lossy().into_owned(),
                detail: source.to_string(),
            },
            EncodeError::EncoderFailed { code, diagnostics } => {
                Self::EncoderFailed { code, diagnostics }
            }
        }
    }
}

/// Setup errors that abort a batch before any file is dispatched.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid input directory {path:?}: {detail}")]
    InvalidDirectory { path: PathBuf, detail: String },

    #[error("Invalid bitrate {bitrate} kbps, it must be a positive integer")]
    InvalidBitrate { bitrate: u32 },

    #[error("Invalid thread count, at least one worker is required")]
    InvalidConcurrency,

    #[error("No matching files found in {directory:?}")]
    NoInputFiles { directory: PathBuf },

    #[error("Unable to scan input directory")]
    Discovery {
        #[from]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[allow(clippy::ref_option)]
fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(
        || "no exit code (terminated by signal)".to_owned(),
        |code| format!("exit code {code}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_failure_keeps_exit_code_and_diagnostics() {
        let reason = FailureReason::from(EncodeError::EncoderFailed {
            code: Some(1),
            diagnostics: "Error parsing input file".to_owned(),
        });

        assert_eq!(reason.to_string(), "EncoderFailed: exited with exit code 1");
        assert_eq!(reason.diagnostics(), Some("Error parsing input file"));
    }

    #[test]
    fn test_encoder_not_found_mentions_program() {
        let reason = FailureReason::from(EncodeError::EncoderNotFound {
            program: PathBuf::from("opusenc"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });

        assert!(matches!(reason, FailureReason::EncoderNotFound { .. }));
        assert!(reason.to_string().starts_with("EncoderNotFound: opusenc"));
        assert_eq!(reason.diagnostics(), None);
    }

    #[test]
    fn test_only_launched_encoders_own_their_output() {
        let missing_input = FailureReason::from(EncodeError::InputNotFound {
            path: PathBuf::from("gone.flac"),
        });
        let existing_output = FailureReason::from(EncodeError::OutputExists {
            path: PathBuf::from("a.opus"),
        });
        let failed = FailureReason::from(EncodeError::EncoderFailed {
            code: Some(1),
            diagnostics: String::new(),
        });

        assert!(!missing_input.encoder_started());
        assert!(!existing_output.encoder_started());
        assert!(failed.encoder_started());
    }

    #[test]
    fn test_signal_termination_is_described() {
        let reason = FailureReason::EncoderFailed {
            code: None,
            diagnostics: String::new(),
        };

        assert!(reason.to_string().contains("terminated by signal"));
        assert_eq!(reason.diagnostics(), None);
    }
}
