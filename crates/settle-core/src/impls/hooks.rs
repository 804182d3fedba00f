//! Ready-made `MachineHooks`.

use std::fmt;

use tracing::{debug, error};

use crate::ports::MachineHooks;

/// Logs success at debug level and errors at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

impl<D, E, P> MachineHooks<D, E, P> for TracingHooks
where
    D: fmt::Debug,
    E: fmt::Debug,
    P: fmt::Debug,
{
    fn on_success(&self, machine: &str, data: &D, payload: &P) {
        debug!(%machine, ?payload, ?data, "onSuccess");
    }

    fn on_error(&self, machine: &str, error: &E, payload: &P) {
        error!(%machine, ?payload, ?error, "onError");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl<D, E, P> MachineHooks<D, E, P> for NoopHooks {}

type SuccessFn<D, P> = Box<dyn Fn(&D, &P) + Send + Sync>;
type ErrorFn<E, P> = Box<dyn Fn(&E, &P) + Send + Sync>;

/// Hooks built from closures. Unset callbacks fall back to `TracingHooks`.
///
/// # Example
/// ```ignore
/// let todos = todos.clone();
/// let hooks = FnHooks::new().on_resolved(move |_todo, _payload| {
///     let todos = todos.clone();
///     tokio::spawn(async move { todos.fetch(ListQuery::default()).await });
/// });
/// ```
pub struct FnHooks<D, E, P> {
    success: Option<SuccessFn<D, P>>,
    error: Option<ErrorFn<E, P>>,
}

impl<D, E, P> FnHooks<D, E, P> {
    pub fn new() -> Self {
        Self {
            success: None,
            error: None,
        }
    }

    pub fn on_resolved(mut self, f: impl Fn(&D, &P) + Send + Sync + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    pub fn on_rejected(mut self, f: impl Fn(&E, &P) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl<D, E, P> Default for FnHooks<D, E, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, E, P> MachineHooks<D, E, P> for FnHooks<D, E, P>
where
    D: fmt::Debug,
    E: fmt::Debug,
    P: fmt::Debug,
{
    fn on_success(&self, machine: &str, data: &D, payload: &P) {
        match &self.success {
            Some(f) => f(data, payload),
            None => <TracingHooks as MachineHooks<D, E, P>>::on_success(
                &TracingHooks,
                machine,
                data,
                payload,
            ),
        }
    }

    fn on_error(&self, machine: &str, error: &E, payload: &P) {
        match &self.error {
            Some(f) => f(error, payload),
            None => <TracingHooks as MachineHooks<D, E, P>>::on_error(
                &TracingHooks,
                machine,
                error,
                payload,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn fn_hooks_call_the_given_closures() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let hooks: FnHooks<u32, String, &str> = FnHooks::new()
            .on_resolved({
                let seen = Arc::clone(&seen);
                move |data, payload| seen.lock().unwrap().push(format!("ok {data} {payload}"))
            })
            .on_rejected({
                let seen = Arc::clone(&seen);
                move |error, payload| seen.lock().unwrap().push(format!("err {error} {payload}"))
            });

        hooks.on_success("m", &1, &"a");
        hooks.on_error("m", &"boom".to_string(), &"b");

        assert_eq!(*seen.lock().unwrap(), vec!["ok 1 a", "err boom b"]);
    }

    #[test]
    fn unset_callbacks_fall_back_to_logging() {
        let hooks: FnHooks<u32, String, &str> = FnHooks::new();
        hooks.on_success("m", &1, &"a");
        hooks.on_error("m", &"boom".to_string(), &"a");
    }
}
