//! Worker state machine states and the bridge status row.

use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle states of a worker instance.
///
/// A closed set: the supervisor never matches on status substrings, it parses
/// the bridge's status text back into one of these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    /// No live process, sandbox removed
    Stopped,
    /// Process spawned, session not yet confirmed
    Starting,
    /// Worker reports a live terminal session
    Running,
    /// Spawn failed, process died, or the worker reported an error
    Error(String),
    /// Graceful termination in progress
    Stopping,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Stopped => "STOPPED",
            WorkerState::Starting => "STARTING",
            WorkerState::Running => "RUNNING",
            WorkerState::Error(_) => "ERROR",
            WorkerState::Stopping => "STOPPING",
        }
    }

    /// Parse a status string plus its error message column back into a state.
    ///
    /// Accepts the legacy `CONNECTED` spelling as `Running`; anything
    /// unrecognized is surfaced as an error state rather than guessed at.
    pub fn parse(status: &str, error_message: &str) -> Self {
        match status.to_uppercase().as_str() {
            "STOPPED" => WorkerState::Stopped,
            "STARTING" => WorkerState::Starting,
            "RUNNING" | "CONNECTED" => WorkerState::Running,
            "STOPPING" => WorkerState::Stopping,
            "ERROR" => WorkerState::Error(error_message.to_string()),
            other => WorkerState::Error(format!("unknown status: {other}")),
        }
    }

    /// Error message carried by this state, if any
    pub fn error_message(&self) -> Option<&str> {
        match self {
            WorkerState::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// True while a process handle is expected to exist
    pub fn is_live(&self) -> bool {
        matches!(self, WorkerState::Starting | WorkerState::Running)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Error(msg) if !msg.is_empty() => write!(f, "ERROR: {msg}"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Single status row a worker writes at the end of every cycle.
///
/// Written after the cycle's data-table writes, so a reader seeing a fresh
/// `last_update` may rely on the data tables reflecting that cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStatusRecord {
    pub login: i64,
    pub status: WorkerState,
    pub connected: bool,
    pub last_update: DateTime<Utc>,
}

impl WorkerStatusRecord {
    pub fn new(login: i64, status: WorkerState, connected: bool) -> Self {
        Self {
            login,
            status,
            connected,
            last_update: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse_roundtrip() {
        assert_eq!(WorkerState::parse("RUNNING", ""), WorkerState::Running);
        assert_eq!(WorkerState::parse("Connected", ""), WorkerState::Running);
        assert_eq!(WorkerState::parse("stopped", ""), WorkerState::Stopped);
        assert_eq!(
            WorkerState::parse("ERROR", "no session"),
            WorkerState::Error("no session".into())
        );
    }

    #[test]
    fn test_state_liveness() {
        assert!(WorkerState::Starting.is_live());
        assert!(WorkerState::Running.is_live());
        assert!(!WorkerState::Stopped.is_live());
        assert!(!WorkerState::Error("x".into()).is_live());
    }

    #[test]
    fn test_unknown_status_is_error() {
        assert!(matches!(
            WorkerState::parse("WEDGED", ""),
            WorkerState::Error(_)
        ));
    }
}
