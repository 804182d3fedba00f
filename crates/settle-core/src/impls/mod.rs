//! Impls - hook implementations shipped with the crate.
//!
//! # Included
//! - **TracingHooks**: logs settlements through `tracing` (the default)
//! - **NoopHooks**: does nothing
//! - **FnHooks**: closures, for wiring one machine's success into another machine

pub mod hooks;

pub use self::hooks::{FnHooks, NoopHooks, TracingHooks};
