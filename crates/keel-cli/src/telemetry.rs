//! Log output for the `keel` binary.
//!
//! Compiled pipelines go to stdout, so every log line is written to stderr.

use std::io;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber.
///
/// `RUST_LOG` wins over `verbose`; `json` switches to one JSON object per line.
pub fn install(json: bool, verbose: bool) -> Result<()> {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let (text, structured) = if json {
        let lines = fmt::layer().with_writer(io::stderr).with_target(verbose);
        (None, Some(lines.json()))
    } else {
        let lines = fmt::layer().with_writer(io::stderr).with_target(verbose);
        (Some(lines), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(structured)
        .try_init()
        .context("Failed to install log subscriber")
}
