use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use indicatif::{HumanDuration, ProgressBar, ProgressState, ProgressStyle};
use tracing::{error, level_filters::LevelFilter};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::error::BatchError;

const COLOR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {prefix:.yellow} [{wide_bar:.cyan/blue}] {percent:>3}% {pos:>5}/{len:5} ({smooth_per_sec:>5} files/s, ETA: {smooth_eta:>3}) {msg:.red}";
const PLAIN_TEMPLATE: &str = "{spinner} [{elapsed_precise}] {prefix} [{wide_bar}] {percent:>3}% {pos:>5}/{len:5} ({smooth_per_sec:>5} files/s, ETA: {smooth_eta:>3}) {msg}";

#[allow(clippy::as_conversions)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_sign_loss)]
pub fn create_progress_style(template: &str) -> anyhow::Result<ProgressStyle> {
    let progress_style = ProgressStyle::with_template(template)
        .with_context(|| format!("Unable to create progress bar style with template '{template}'"))?
        .with_key("smooth_eta", |s: &ProgressState, w: &mut dyn Write| {
            match (s.pos(), s.len()) {
                (pos, Some(len)) if pos > 0 => write!(
                    w,
                    "{:#}",
                    HumanDuration(Duration::from_millis(
                        (s.elapsed().as_millis() as f64 * (len as f64 - pos as f64) / pos as f64)
                            .round() as u64
                    ))
                ),
                _ => write!(w, "-"),
            }
            .unwrap_or_else(|err| {
                error!("Unexpected error while formatting smooth_eta in progress bar: {err}");
            });
        })
        .with_key("smooth_per_sec", |s: &ProgressState, w: &mut dyn Write| {
            match (s.pos(), s.elapsed().as_millis()) {
                (pos, elapsed_ms) if elapsed_ms > 0 => {
                    write!(w, "{:.2}", pos as f64 * 1000_f64 / elapsed_ms as f64)
                }
                _ => write!(w, "-"),
            }
            .unwrap_or_else(|err| {
                error!("Unexpected error while formatting smooth_per_sec in progress bar: {err}");
            });
        });

    Ok(progress_style)
}

/// Builds the batch progress bar, drawn to stderr.
pub fn create_progress_bar(workers: usize, use_color: bool) -> anyhow::Result<ProgressBar> {
    let template = if use_color {
        COLOR_TEMPLATE
    } else {
        PLAIN_TEMPLATE
    };

    let progress_bar = ProgressBar::new(0).with_style(
        create_progress_style(template).context("Unable to create transcoding progress style")?,
    );

    progress_bar.set_prefix(format!("Transcoding using {workers} threads"));
    progress_bar.enable_steady_tick(Duration::from_millis(250));

    Ok(progress_bar)
}

pub fn install_tracing(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .context("Unable to initialize global default subscriber")?;

    Ok(())
}

/// Checks that `path` names an existing, readable directory.
pub fn verify_directory(path: &Path) -> Result<(), BatchError> {
    let metadata = std::fs::metadata(path).map_err(|error| BatchError::InvalidDirectory {
        path: path.to_path_buf(),
        detail: error.to_string(),
    })?;

    if !metadata.is_dir() {
        return Err(BatchError::InvalidDirectory {
            path: path.to_path_buf(),
            detail: "exists but is not a directory".to_owned(),
        });
    }

    Ok(())
}
