//! Ports - the seams a machine is wired to.
//!
//! # Ports
//! - **TaskExecutor**: the async operation being orchestrated (an HTTP call, a query, ...)
//! - **MachineHooks**: success / error notifications emitted on settlement

pub mod executor;
pub mod hooks;

pub use self::executor::{FnExecutor, TaskExecutor, executor_fn};
pub use self::hooks::MachineHooks;
