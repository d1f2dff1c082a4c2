use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by loaders while reading or persisting locale data.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// A locale file or directory could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },
    /// A locale file could not be written
    #[error("Failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },
    /// Pending values could not be applied to the file contents
    #[error("Failed to edit {}: {message}", path.display())]
    Edit { path: PathBuf, message: String },
    /// No file is known or can be derived for the pending write
    #[error("No file can store '{keypath}' for locale '{locale}'")]
    NoTarget { keypath: String, locale: String },
    /// The configured file glob is invalid
    #[error("Invalid file pattern '{pattern}': {source}")]
    Pattern { pattern: String, source: globset::Error },
    /// One or more sources failed to persist their batch
    #[error("{} write(s) failed:\n{}", .0.len(), format_failures(.0))]
    WriteFailures(Vec<WriteFailure>),
    /// One or more sources could not be re-read
    #[error("{} reload(s) failed:\n{}", .0.len(), format_failures(.0))]
    ReloadFailures(Vec<WriteFailure>),
}

/// A failure attributed to the source that raised it.
#[derive(Error, Debug)]
#[error("[{loader}] {error}")]
pub struct WriteFailure {
    pub loader: String,
    #[source]
    pub error: LoaderError,
}

impl WriteFailure {
    #[must_use]
    pub fn new(loader: impl Into<String>, error: LoaderError) -> Self {
        Self { loader: loader.into(), error }
    }
}

impl LoaderError {
    /// Flattens this error into per-source failures, attributing plain errors to `loader`.
    #[must_use]
    pub fn into_failures(self, loader: &str) -> Vec<WriteFailure> {
        match self {
            Self::WriteFailures(failures) | Self::ReloadFailures(failures) => failures,
            error => vec![WriteFailure::new(loader, error)],
        }
    }
}

fn format_failures(failures: &[WriteFailure]) -> String {
    failures
        .iter()
        .enumerate()
        .map(|(i, failure)| format!("  {}. {failure}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
