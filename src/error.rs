// src/error.rs

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Every failure the recorder and the offline pipeline can surface.
#[derive(Error, Debug)]
pub enum P300Error {
    /// Session prepare/stream/poll/release failure reported by the gateway
    #[error("hardware I/O failed during {operation}: {reason}")]
    HardwareIo {
        /// Gateway call that failed
        operation: &'static str,
        /// Gateway-provided reason
        reason: String,
    },

    /// Missing, unreadable or unwritable artifact
    #[error("cannot access {}: {reason}", path.display())]
    FileAccess {
        /// Offending file
        path: PathBuf,
        /// Underlying I/O or CSV error
        reason: String,
    },

    /// Column-layout mismatch, wrong channel count, unparsable cell
    #[error("data shape mismatch: {0}")]
    DataShape(String),

    /// A poll or join outlived its deadline
    #[error("{operation} exceeded its {deadline:?} deadline")]
    ConcurrencyTimeout {
        /// Operation that timed out
        operation: &'static str,
        /// Deadline that was exceeded
        deadline: Duration,
    },

    /// Invalid or unreadable configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Foreground presentation failure
    #[error("stimulus presentation failed: {0}")]
    Scheduler(String),
}

impl P300Error {
    pub fn hardware(operation: &'static str, reason: impl ToString) -> Self {
        Self::HardwareIo {
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn file_access(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileAccess {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, P300Error>;
