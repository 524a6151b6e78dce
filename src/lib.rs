use std::fs::File;
use std::io::IsTerminal;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use colored::Colorize;

pub mod batch;
pub mod config;
pub mod encoder;
pub mod error;
pub mod progress;
pub mod scheduler;
pub mod summary;
pub mod task;
pub mod util;

use crate::batch::BatchReport;
use crate::encoder::OpusEnc;
use crate::error::BatchError;

/// Runs a whole batch as configured on the command line.
///
/// Returns `None` when there was nothing to convert.
#[allow(clippy::print_stdout)]
pub fn run(config: &config::Config, cancel: &AtomicBool) -> anyhow::Result<Option<BatchReport>> {
    // The progress bar draws on stderr, the summary goes to stdout.
    let settings = config.batch_settings(
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    // NO_COLOR and CLICOLOR would otherwise override the decision made above.
    colored::control::set_override(settings.use_color);

    let encoder = OpusEnc::new(&config.encoder, config.verbose);

    let report = match batch::run(&config.input_directory, &settings, &encoder, cancel) {
        Ok(report) => report,
        Err(BatchError::NoInputFiles { .. }) => {
            let message = "No FLAC files found in the specified directory.";

            if settings.use_color {
                println!("{}", message.red());
            } else {
                println!("{message}");
            }

            return Ok(None);
        }
        Err(error) => {
            return Err(error).with_context(|| {
                format!("Unable to transcode {:?}", config.input_directory)
            });
        }
    };

    print!("{}", summary::render(&report, settings.use_color));

    if let Some(path) = &config.report {
        serde_json::to_writer_pretty(
            &File::create(path).with_context(|| format!("Unable to create report file {path:?}"))?,
            &report,
        )
        .with_context(|| format!("Unable to write report to {path:?}"))?;
    }

    Ok(Some(report))
}
