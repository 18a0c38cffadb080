use crate::core::progress::TransferError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InstallError>;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Download of {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Cannot open archive {path}: {source}")]
    ArchiveOpen {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Cannot read archive entry #{index}: {source}")]
    ArchiveRead {
        index: usize,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Cannot prepare destination {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Illegal file path in archive: {entry}")]
    PathTraversal { entry: String },

    #[error("Failed to extract '{entry}': {source}")]
    ExtractionWrite {
        entry: String,
        #[source]
        source: TransferError,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration directory not found")]
    ConfigDirectoryNotFound,

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("No source URL given (pass one or run `zipinstall config set-url`)")]
    MissingSource,
}

impl InstallError {
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        InstallError::Config {
            message: message.into(),
        }
    }

    pub fn network_error<U: Into<String>, S: ToString>(url: U, message: S) -> Self {
        InstallError::Network {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Wrap a filesystem failure for an archive entry as a write-side transfer error.
    pub fn entry_write(entry: &str, source: std::io::Error) -> Self {
        InstallError::ExtractionWrite {
            entry: entry.to_string(),
            source: TransferError::Write {
                transferred: 0,
                source,
            },
        }
    }
}
