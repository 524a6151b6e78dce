#![warn(future_incompatible)]
#![warn(let_underscore)]
#![warn(clippy::cargo)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![warn(clippy::restriction)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::blanket_clippy_restriction_lints)]
#![allow(clippy::exhaustive_enums)]
#![allow(clippy::exhaustive_structs)]
#![allow(clippy::implicit_return)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_inline_in_public_items)]
#![allow(clippy::pattern_type_mismatch)]
#![allow(clippy::separated_literal_suffix)]
#![allow(clippy::shadow_reuse)]
#![allow(clippy::std_instead_of_core)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::warn;

use flac2opus::config;
use flac2opus::util;

fn main() -> anyhow::Result<()> {
    let config = config::Config::parse();

    util::install_tracing(config.verbose).context("Unable to install tracing subsystem")?;

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_handler = Arc::clone(&cancel);

    ctrlc::set_handler(move || {
        if cancel_handler.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }

        warn!("Interrupted, finishing files in progress (press Ctrl+C again to abort)");
    })
    .context("Unable to install Ctrl+C handler")?;

    flac2opus::run(&config, &cancel).context("Unable to run application")?;

    Ok(())
}
