//! zipinstall library
//!
//! Streams a remote zip archive to disk with progress reporting, then unpacks
//! it below a destination directory while refusing entries that would escape
//! it ("zip-slip").

pub mod commands;
pub mod core;
pub mod error;
pub mod utils;

pub use crate::core::extract::{ArchiveEntry, ExtractReporter, ExtractSummary, SafeExtractor};
pub use crate::core::installer::Installer;
pub use crate::core::progress::{CancelToken, ProgressWriter, TransferError};
pub use crate::core::state::{InstallState, Phase, ProgressTracker, Snapshot};
pub use crate::error::{InstallError, Result};
