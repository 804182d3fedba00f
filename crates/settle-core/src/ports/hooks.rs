//! MachineHooks port - settlement notifications.

/// Side-effecting notifications emitted when a machine settles.
///
/// Hooks never influence transitions. They run on the machine's actor task
/// right after the transition, so they should return quickly; spawn a task
/// for anything that awaits (for example, sending `Fetch` to another machine).
///
/// Both methods default to no-ops.
pub trait MachineHooks<D, E, P>: Send + Sync {
    /// Entered Resolved with `data`, fetched with `payload`.
    fn on_success(&self, _machine: &str, _data: &D, _payload: &P) {}

    /// Settled with `error` for `payload` (normally entering Rejected).
    fn on_error(&self, _machine: &str, _error: &E, _payload: &P) {}
}
