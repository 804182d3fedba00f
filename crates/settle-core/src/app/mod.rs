//! App - runtime layer
//!
//! Drives the pure `domain` core on tokio.
//!
//! # Components
//! - **MachineBuilder**: validation and wiring; spawns the actor
//! - **MachineHandle**: cloneable client (events in, snapshots out)
//! - **MachineActor**: one task per machine, owns the state machine
//! - **ExecutionUnit**: one attempt-and-retry cycle around the executor

pub mod builder;
pub mod execution;
pub mod handle;
mod machine;

pub use self::builder::{BuildError, MachineBuilder};
pub use self::execution::{ExecutionUnit, UnitState};
pub use self::handle::MachineHandle;
