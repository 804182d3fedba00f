//! Machine state tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally observable state of a machine.
///
/// State transitions:
/// - Idle -> Pending -> Resolved | Rejected
/// - Resolved | Rejected -> Pending (foreground fetch)
/// - Resolved -> Refetching -> Resolved | Rejected (background fetch)
///
/// Retries are not a state of their own: while an execution unit is retrying,
/// the machine stays in Pending or Refetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// Nothing fetched yet.
    Idle,

    /// Foreground execution in flight.
    Pending,

    /// Background execution in flight; the previous response is still visible.
    Refetching,

    /// Last execution succeeded.
    Resolved,

    /// Last execution failed after all retries.
    Rejected,
}

impl MachineState {
    /// Is an execution unit running for this state?
    pub fn is_in_flight(self) -> bool {
        matches!(self, MachineState::Pending | MachineState::Refetching)
    }

    /// Has the last execution settled?
    pub fn is_settled(self) -> bool {
        matches!(self, MachineState::Resolved | MachineState::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MachineState::Idle => "idle",
            MachineState::Pending => "pending",
            MachineState::Refetching => "refetching",
            MachineState::Resolved => "resolved",
            MachineState::Rejected => "rejected",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
