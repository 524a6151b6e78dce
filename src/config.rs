use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

use crate::batch::{BatchSettings, DEFAULT_BITRATE, SOURCE_EXTENSION};

#[derive(Clone, Parser, Debug)]
#[command(author, version, about = "Transcode FLAC files to Opus format", long_about = None)]
pub struct Config {
    /// Path to the input directory containing FLAC files
    pub input_directory: PathBuf,

    /// Bitrate for Opus encoding in kbps
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..), default_value_t = DEFAULT_BITRATE)]
    pub bitrate: u32,

    /// Number of threads for parallel transcoding [default: number of available CPU cores]
    #[arg(short, long)]
    pub threads: Option<NonZeroUsize>,

    /// Opus encoder executable
    #[arg(short, long, default_value = "opusenc")]
    pub encoder: PathBuf,

    /// Show debug logging and encoder output for every file
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Write the final report as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

impl Config {
    /// Requested worker count, defaulting to the available parallelism.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get)
    }

    /// `show_progress` follows the stream the bar draws on (stderr);
    /// `color_terminal` follows the stream the summary is printed to (stdout).
    #[must_use]
    pub fn batch_settings(&self, show_progress: bool, color_terminal: bool) -> BatchSettings {
        BatchSettings {
            bitrate_kbps: self.bitrate,
            concurrency: self.threads(),
            source_extension: SOURCE_EXTENSION.to_owned(),
            show_progress,
            use_color: color_terminal && !self.no_color,
        }
    }
}
