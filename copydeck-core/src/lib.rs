//! Content revision pipeline: backups, change log, section status, batch
//! field edits and the stage orchestrator that ties them together.

pub mod backup;
pub mod commands;
pub mod config;
pub mod document;
mod error;
pub mod history;
pub mod mutator;
pub mod status;
pub mod workflow;

pub use config::{load_config, PipelineConfig};
pub use error::PipelineError;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence; otherwise `info`, or `debug` when `verbose`.
/// Calling this more than once is harmless.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
