//! settle-core
//!
//! Retrying async-task orchestrator. A machine runs a user-supplied task,
//! retries failures with a fixed delay, supports background refetch and
//! local updates of the stored response, and publishes every state change.
//!
//! # Modules
//! - **domain**: state, context, events, retry options and the pure transition core
//! - **ports**: seams for user code (`TaskExecutor`, `MachineHooks`)
//! - **impls**: stock hooks (tracing, no-op, closures)
//! - **app**: tokio runtime (builder, handle, actor, execution unit)
//! - **error**: `SettleError`

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

pub use app::{BuildError, MachineBuilder, MachineHandle};
pub use domain::{
    BackgroundPayload, Event, EventKind, InFlight, MachineState, RefetchFailure, RetryOptions,
    RetryOverrides, Settlement, Snapshot,
};
pub use error::SettleError;
pub use impls::{FnHooks, NoopHooks, TracingHooks};
pub use ports::{FnExecutor, MachineHooks, TaskExecutor, executor_fn};
