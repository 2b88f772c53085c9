//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors surfaced to the terminal
#[derive(Debug, Error)]
pub enum CliError {
    /// The schedule file parsed but contains no runs
    #[error("Schedule file {path} contains no runs")]
    EmptySchedule {
        /// Schedule file path
        path: PathBuf,
    },

    /// Error from the framework library
    #[error(transparent)]
    Framework(#[from] ensayar::EnsayarError),
}
