use thiserror::Error;

use crate::domain::{EventKind, MachineState};

/// Errors returned to callers of a machine.
///
/// These describe misuse of the machine (wrong state, bad payload patch,
/// stopped actor). Failures of the task itself are never reported here; they
/// end up in `MachineContext::error`.
#[derive(Debug, Error)]
pub enum SettleError {
    #[error("event {event} is not accepted in state={state}")]
    NotAccepted {
        event: EventKind,
        state: MachineState,
    },

    #[error("an execution is already in flight (state={state})")]
    Busy { state: MachineState },

    #[error("no stored payload to refetch with")]
    MissingPayload,

    #[error("partial payload merge requires JSON objects on both sides")]
    PayloadNotObject,

    #[error("partial payload merge failed: {0}")]
    PayloadMerge(#[from] serde_json::Error),

    #[error("machine has stopped")]
    Closed,
}
