//! Core identifiers, lifecycle states, and the crate-wide error type.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identifier for a game loop.
///
/// `in_game_loop` compares this against the calling thread's execution
/// context, so the id must be cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(u64);

impl LoopId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a game loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// Accepting submissions and ticking.
    Running = 0,
    /// Shutdown initiated; no new submissions accepted.
    ShuttingDown = 1,
    /// Worker thread has exited and the queue is drained.
    Terminated = 2,
}

impl LoopState {
    /// Convert from u8
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::ShuttingDown,
            _ => Self::Terminated,
        }
    }

    /// True once shutdown has been initiated (including after termination).
    pub fn is_shutdown(&self) -> bool {
        !matches!(self, LoopState::Running)
    }

    /// True once the worker has fully drained and exited.
    pub fn is_terminated(&self) -> bool {
        matches!(self, LoopState::Terminated)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Running => write!(f, "running"),
            LoopState::ShuttingDown => write!(f, "shutting-down"),
            LoopState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the runtime.
///
/// Per-task and per-handler faults are not represented here as thrown
/// values: they are caught at the point of invocation, logged, and
/// isolated. Only structural failures reach the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Submission to a loop that has begun shutting down.
    #[error("game loop '{0}' rejected the task: shutting down")]
    Rejected(String),

    /// The task never produced a result: it was dropped by `shutdown_now`
    /// or its execution panicked.
    #[error("task aborted before completing")]
    Aborted,

    /// A batch operation was handed zero tasks.
    #[error("empty task batch")]
    EmptyBatch,
}

/// Best-effort human-readable payload of a caught panic.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_state_roundtrip() {
        for state in [
            LoopState::Running,
            LoopState::ShuttingDown,
            LoopState::Terminated,
        ] {
            assert_eq!(LoopState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_loop_state_predicates() {
        assert!(!LoopState::Running.is_shutdown());
        assert!(LoopState::ShuttingDown.is_shutdown());
        assert!(LoopState::Terminated.is_shutdown());
        assert!(LoopState::Terminated.is_terminated());
        assert!(!LoopState::ShuttingDown.is_terminated());
    }

    #[test]
    fn test_loop_ids_unique() {
        let a = LoopId::next();
        let b = LoopId::next();
        assert_ne!(a, b);
    }
}
