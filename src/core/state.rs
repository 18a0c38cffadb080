//! Status shared between the install worker and whatever renders it.
//!
//! The worker is the only writer. Readers take a [`Snapshot`] copy under the
//! lock and never see a half-updated status.

use crate::core::extract::{ArchiveEntry, ExtractReporter};
use crate::error::{InstallError, Result};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    Idle,
    Running,
    Succeeded,
    Failed(String),
}

impl InstallState {
    pub fn can_transition_to(&self, next: &InstallState) -> bool {
        matches!(
            (self, next),
            (InstallState::Idle, InstallState::Running)
                | (InstallState::Running, InstallState::Succeeded)
                | (InstallState::Running, InstallState::Failed(_))
                | (InstallState::Failed(_), InstallState::Idle)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallState::Succeeded | InstallState::Failed(_))
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallState::Idle => write!(f, "idle"),
            InstallState::Running => write!(f, "running"),
            InstallState::Succeeded => write!(f, "succeeded"),
            InstallState::Failed(_) => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Downloading,
    Extracting,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: InstallState,
    pub phase: Phase,
    /// Human-readable description of what is happening right now.
    pub status: String,
    /// Fraction of the current transfer: the download, or the entry being unpacked.
    pub progress: f64,
    /// Whole-operation fraction in `[0, 1]`, never decreasing during a run.
    pub overall: f64,
    /// Bytes accepted by the download sink so far.
    pub bytes: u64,
    pub entry: Option<String>,
    entry_index: usize,
    entry_total: usize,
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            state: InstallState::Idle,
            phase: Phase::Idle,
            status: String::new(),
            progress: 0.0,
            overall: 0.0,
            bytes: 0,
            entry: None,
            entry_index: 0,
            entry_total: 0,
        }
    }
}

/// Cloneable handle to the shared [`Snapshot`].
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<Snapshot>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    pub fn state(&self) -> InstallState {
        self.lock().state.clone()
    }

    pub fn transition(&self, next: InstallState) -> Result<()> {
        let mut snap = self.lock();
        if !snap.state.can_transition_to(&next) {
            return Err(InstallError::InvalidTransition {
                from: snap.state.to_string(),
                to: next.to_string(),
            });
        }

        match &next {
            InstallState::Idle => *snap = Snapshot::default(),
            InstallState::Running => {
                *snap = Snapshot::default();
                snap.status = "Starting...".to_string();
            }
            InstallState::Succeeded => {
                snap.phase = Phase::Done;
                snap.status = "Installation complete".to_string();
                snap.overall = 1.0;
                snap.entry = None;
            }
            InstallState::Failed(message) => {
                snap.status = message.clone();
                snap.entry = None;
            }
        }
        snap.state = next;
        Ok(())
    }

    /// Return a failed run to `Idle` so it can be retried.
    pub fn reset(&self) -> Result<()> {
        self.transition(InstallState::Idle)
    }

    pub fn begin_download(&self, url: &str) {
        let mut snap = self.lock();
        snap.phase = Phase::Downloading;
        snap.status = format!("Downloading {url}...");
        snap.progress = 0.0;
        snap.bytes = 0;
    }

    pub fn download_progress(&self, fraction: f64) {
        let mut snap = self.lock();
        snap.progress = fraction;
        snap.overall = snap.overall.max(0.5 * fraction.clamp(0.0, 1.0));
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.lock().bytes = bytes;
    }

    pub fn begin_extract(&self) {
        let mut snap = self.lock();
        snap.phase = Phase::Extracting;
        snap.status = "Decompressing archive...".to_string();
        snap.progress = 0.0;
        snap.overall = snap.overall.max(0.5);
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ExtractReporter for ProgressTracker {
    fn entry_started(&mut self, entry: &ArchiveEntry, index: usize, total: usize) {
        let mut snap = self.lock();
        snap.status = format!("Decompressing {}", entry.name);
        snap.entry = Some(entry.name.clone());
        snap.entry_index = index;
        snap.entry_total = total;
        snap.progress = 0.0;
    }

    fn entry_progress(&mut self, fraction: f64) {
        let mut snap = self.lock();
        snap.progress = fraction;
        if snap.entry_total > 0 {
            let done = snap.entry_index as f64 + fraction.clamp(0.0, 1.0);
            let overall = 0.5 + 0.5 * done / snap.entry_total as f64;
            snap.overall = snap.overall.max(overall);
        }
    }
}
