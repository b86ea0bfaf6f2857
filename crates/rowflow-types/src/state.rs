//! Step lifecycle and graph outcome enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one step copy.
///
/// `Created → Initialized → Running → {Finished | Stopped | Errored}
/// → Disposed`. The numeric repr is stable so the engine can store the
/// state in an atomic without locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StepState {
    Created = 0,
    Initialized = 1,
    Running = 2,
    Finished = 3,
    Stopped = 4,
    Errored = 5,
    Disposed = 6,
}

impl StepState {
    /// Decode from the atomic repr. Unknown values map to `Created`;
    /// they cannot be produced by the engine itself.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initialized,
            2 => Self::Running,
            3 => Self::Finished,
            4 => Self::Stopped,
            5 => Self::Errored,
            6 => Self::Disposed,
            _ => Self::Created,
        }
    }

    /// `true` once the processing loop has exited by any path.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Stopped | Self::Errored | Self::Disposed
        )
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
            Self::Disposed => "disposed",
        };
        f.write_str(s)
    }
}

/// Overall result of a graph run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphOutcome {
    /// Every step finished normally and no errors were counted.
    Finished,
    /// A stop was requested before completion; not an error.
    Stopped,
    /// At least one step failed fatally.
    Errored,
}

impl GraphOutcome {
    /// `true` for a fully successful run.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl fmt::Display for GraphOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Finished => "finished",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_roundtrip() {
        for state in [
            StepState::Created,
            StepState::Initialized,
            StepState::Running,
            StepState::Finished,
            StepState::Stopped,
            StepState::Errored,
            StepState::Disposed,
        ] {
            assert_eq!(StepState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!StepState::Running.is_terminal());
        assert!(StepState::Stopped.is_terminal());
        assert!(StepState::Disposed.is_terminal());
    }

    #[test]
    fn serde_snake_case() {
        let json = serde_json::to_string(&StepState::Initialized).unwrap();
        assert_eq!(json, "\"initialized\"");
        let json = serde_json::to_string(&GraphOutcome::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
    }
}
