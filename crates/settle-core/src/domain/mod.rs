//! Domain model (options, states, events, outcomes, the pure transition core).
//!
//! Nothing in here spawns tasks or touches timers. The async side lives in
//! `crate::app`.

pub mod context;
pub mod event;
pub mod meta;
pub mod options;
pub mod outcome;
pub mod payload;
pub mod state;
pub mod transition;

pub use context::{MachineContext, Snapshot};
pub use event::{BackgroundPayload, Event, EventKind, Transform};
pub use meta::TaskMeta;
pub use options::{RetryOptions, RetryOverrides};
pub use outcome::{Settlement, UnitReport};
pub use payload::{Data, Payload, merge_partial};
pub use state::MachineState;
pub use transition::{Effect, InFlight, Input, MachinePolicy, RefetchFailure, StateMachine};
