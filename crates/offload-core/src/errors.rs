//! Error categorization for a single offload cycle.
//!
//! A failed cycle never stops the scheduler; the category only decides how it
//! is logged:
//! - Sink: the transient output file could not be created or read
//! - Spawn: the copy tool could not be started
//! - ToolFailed: the copy tool exited unsuccessfully for a reason other than "no match"
//! - Join: the blocking worker running the cycle panicked or was cancelled

use std::io;
use std::process::ExitStatus;

use crate::invoker::RunId;

/// Category of cycle failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleErrorKind {
    Sink,
    Spawn,
    ToolFailed,
    Join,
}

/// A cycle failure tagged with the run that produced it.
#[derive(Debug)]
pub struct CycleError {
    pub run: RunId,
    pub kind: CycleErrorKind,
    pub message: String,
}

impl CycleError {
    pub fn sink(run: RunId, err: impl std::fmt::Display) -> Self {
        Self {
            run,
            kind: CycleErrorKind::Sink,
            message: format!("job output file: {err}"),
        }
    }

    pub fn spawn(run: RunId, binary: &std::path::Path, err: &io::Error) -> Self {
        Self {
            run,
            kind: CycleErrorKind::Spawn,
            message: format!("failed to start {}: {err}", binary.display()),
        }
    }

    pub fn tool_failed(run: RunId, status: ExitStatus, detail: Option<String>) -> Self {
        let message = match detail {
            Some(detail) => format!("copy tool exited with {status}: {detail}"),
            None => format!("copy tool exited with {status}"),
        };
        Self {
            run,
            kind: CycleErrorKind::ToolFailed,
            message,
        }
    }

    pub fn join(run: RunId, err: impl std::fmt::Display) -> Self {
        Self {
            run,
            kind: CycleErrorKind::Join,
            message: format!("cycle worker did not complete: {err}"),
        }
    }
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run {}: {}", self.run, self.message)
    }
}

impl std::error::Error for CycleError {}

/// Result type for a single cycle.
pub type CycleResult<T> = std::result::Result<T, CycleError>;
