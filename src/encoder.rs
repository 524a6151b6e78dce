use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::EncodeError;

const DIAGNOSTIC_LINES: usize = 32;

/// Converts one input file into one output file at a target bitrate.
pub trait Encoder: Send + Sync {
    /// Human readable encoder name, used in logs.
    fn name(&self) -> &str;

    /// Extension of the files this encoder produces, without the dot.
    fn extension(&self) -> &str;

    /// Encodes `input` into `output`.
    ///
    /// On failure the caller owns cleanup: a partially written `output` may be
    /// left behind and must be treated as untrusted.
    fn encode(&self, input: &Path, output: &Path, bitrate_kbps: u32) -> Result<(), EncodeError>;
}

/// `opusenc` from opus-tools, invoked with the music tuning profile.
#[derive(Clone, Debug)]
pub struct OpusEnc {
    program: PathBuf,
    verbose: bool,
}

impl OpusEnc {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, verbose: bool) -> Self {
        Self {
            program: program.into(),
            verbose,
        }
    }

    #[must_use]
    pub fn arguments(&self, input: &Path, output: &Path, bitrate_kbps: u32) -> Vec<OsString> {
        let mut arguments: Vec<OsString> = vec![];

        if !self.verbose {
            arguments.push("--quiet".into());
        }

        arguments.push("--music".into());
        arguments.push("--bitrate".into());
        arguments.push(bitrate_kbps.to_string().into());
        arguments.push(input.into());
        arguments.push(output.into());

        arguments
    }
}

impl Default for OpusEnc {
    fn default() -> Self {
        Self::new("opusenc", false)
    }
}

impl Encoder for OpusEnc {
    fn name(&self) -> &str {
        "opusenc"
    }

    fn extension(&self) -> &str {
        "opus"
    }

    fn encode(&self, input: &Path, output: &Path, bitrate_kbps: u32) -> Result<(), EncodeError> {
        check_request(input, output, bitrate_kbps)?;

        let arguments = self.arguments(input, output, bitrate_kbps);
        debug!("Running {:?} {:?}", self.program, arguments);

        let result = Command::new(&self.program)
            .args(&arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| EncodeError::EncoderNotFound {
                program: self.program.clone(),
                source,
            })?;

        let diagnostics = collect_diagnostics(&result.stdout, &result.stderr);

        if self.verbose && !diagnostics.is_empty() {
            info!("{} output for {input:?}:\n{diagnostics}", self.name());
        }

        if !result.status.success() {
            return Err(EncodeError::EncoderFailed {
                code: result.status.code(),
                diagnostics,
            });
        }

        Ok(())
    }
}

/// Validates the invocation contract shared by every encoder.
pub fn check_request(input: &Path, output: &Path, bitrate_kbps: u32) -> Result<(), EncodeError> {
    if bitrate_kbps == 0 {
        return Err(EncodeError::InvalidBitrate {
            bitrate: bitrate_kbps,
        });
    }

    if !input.is_file() {
        return Err(EncodeError::InputNotFound {
            path: input.to_path_buf(),
        });
    }

    if output.exists() {
        return Err(EncodeError::OutputExists {
            path: output.to_path_buf(),
        });
    }

    Ok(())
}

// Keeps only the tail of the combined output, the part that explains a failure.
fn collect_diagnostics(stdout: &[u8], stderr: &[u8]) -> String {
    let mut lines = VecDeque::with_capacity(DIAGNOSTIC_LINES);

    for stream in [stdout, stderr] {
        for line in String::from_utf8_lossy(stream).lines() {
            let line = line.trim_end();

            if line.is_empty() {
                continue;
            }

            lines.push_back(line.to_owned());

            while lines.len() > DIAGNOSTIC_LINES {
                lines.pop_front();
            }
        }
    }

    Vec::from(lines).join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_use_music_profile_and_bitrate() {
        let encoder = OpusEnc::default();
        let arguments = encoder.arguments(Path::new("in.flac"), Path::new("in.opus"), 128);

        assert_eq!(
            arguments,
            vec!["--quiet", "--music", "--bitrate", "128", "in.flac", "in.opus"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_verbose_arguments_are_not_quiet() {
        let encoder = OpusEnc::new("opusenc", true);
        let arguments = encoder.arguments(Path::new("a.flac"), Path::new("a.opus"), 192);

        assert_eq!(arguments.first(), Some(&OsString::from("--music")));
        assert_eq!(arguments.len(), 5);
    }

    #[test]
    fn test_rejects_zero_bitrate() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.flac");
        std::fs::write(&input, b"fLaC").unwrap();

        let result = OpusEnc::default().encode(&input, &dir.path().join("a.opus"), 0);

        assert!(matches!(result, Err(EncodeError::InvalidBitrate { bitrate: 0 })));
    }

    #[test]
    fn test_rejects_missing_input() {
        let dir = tempfile::tempdir().unwrap();

        let result = OpusEnc::default().encode(
            &dir.path().join("missing.flac"),
            &dir.path().join("missing.opus"),
            192,
        );

        assert!(matches!(result, Err(EncodeError::InputNotFound { .. })));
    }

    #[test]
    fn test_refuses_to_overwrite_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.flac");
        let output = dir.path().join("a.opus");
        std::fs::write(&input, b"fLaC").unwrap();
        std::fs::write(&output, b"OggS").unwrap();

        let result = OpusEnc::default().encode(&input, &output, 192);

        assert!(matches!(result, Err(EncodeError::OutputExists { .. })));
        assert_eq!(std::fs::read(&output).unwrap(), b"OggS");
    }

    #[test]
    fn test_missing_program_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.flac");
        std::fs::write(&input, b"fLaC").unwrap();

        let encoder = OpusEnc::new(dir.path().join("no-such-opusenc"), false);
        let result = encoder.encode(&input, &dir.path().join("a.opus"), 192);

        assert!(matches!(result, Err(EncodeError::EncoderNotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_encoder_failed() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.flac");
        std::fs::write(&input, b"fLaC").unwrap();

        let result = OpusEnc::new("false", false).encode(&input, &dir.path().join("a.opus"), 192);

        assert!(matches!(
            result,
            Err(EncodeError::EncoderFailed { code: Some(1), .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_zero_exit_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.flac");
        std::fs::write(&input, b"fLaC").unwrap();

        let result = OpusEnc::new("true", false).encode(&input, &dir.path().join("a.opus"), 192);

        assert!(result.is_ok());
    }

    #[test]
    fn test_diagnostics_keep_the_tail() {
        let stderr = (0..40)
            .map(|index| format!("line {index}\n"))
            .collect::<String>();

        let diagnostics = collect_diagnostics(b"\n", stderr.as_bytes());
        let lines = diagnostics.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), DIAGNOSTIC_LINES);
        assert_eq!(lines.first(), Some(&"line 8"));
        assert_eq!(lines.last(), Some(&"line 39"));
    }
}
