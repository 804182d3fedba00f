//! Machine context and the snapshots handed to observers.

use std::sync::Arc;

use super::meta::TaskMeta;
use super::options::RetryOptions;
use super::outcome::Settlement;
use super::state::MachineState;

/// `{ response, error, meta }` for one machine.
///
/// Invariant: `response` and `error` are never both present. After a
/// settlement exactly one of them is; in Idle neither is.
///
/// Fields are private so the invariant can only be broken from inside this
/// module.
#[derive(Debug, Clone)]
pub struct MachineContext<D, E, P> {
    response: Option<D>,
    error: Option<E>,
    meta: TaskMeta<P>,
}

impl<D, E, P> MachineContext<D, E, P> {
    pub fn new(options: Arc<RetryOptions>) -> Self {
        Self {
            response: None,
            error: None,
            meta: TaskMeta::new(options),
        }
    }

    pub fn response(&self) -> Option<&D> {
        self.response.as_ref()
    }

    pub fn error(&self) -> Option<&E> {
        self.error.as_ref()
    }

    pub fn meta(&self) -> &TaskMeta<P> {
        &self.meta
    }

    /// Payload of the most recent fetch.
    pub fn payload(&self) -> Option<&P> {
        self.meta.payload.as_ref()
    }

    pub(crate) fn meta_mut(&mut self) -> &mut TaskMeta<P> {
        &mut self.meta
    }

    /// Fold a settlement in, replacing both sides.
    pub(crate) fn settle(&mut self, settlement: Settlement<D, E>) {
        let (response, error) = settlement.into_parts();
        self.response = response;
        self.error = error;
    }

    /// Replace the response with `transform(response)`.
    ///
    /// Returns false (and leaves the context alone) when there is no response.
    pub(crate) fn project(&mut self, transform: impl FnOnce(D) -> D) -> bool {
        match self.response.take() {
            Some(response) => {
                self.response = Some(transform(response));
                true
            }
            None => false,
        }
    }
}

/// Immutable view published after every transition.
#[derive(Debug, Clone)]
pub struct Snapshot<D, E, P> {
    pub state: MachineState,
    pub context: MachineContext<D, E, P>,
}

impl<D, E, P> Snapshot<D, E, P> {
    pub fn response(&self) -> Option<&D> {
        self.context.response()
    }

    pub fn error(&self) -> Option<&E> {
        self.context.error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> MachineContext<Vec<u32>, String, ()> {
        MachineContext::new(Arc::new(RetryOptions::default()))
    }

    #[test]
    fn new_context_is_empty() {
        let ctx = context();
        assert!(ctx.response().is_none());
        assert!(ctx.error().is_none());
        assert!(ctx.payload().is_none());
        assert_eq!(ctx.meta().retry_attempts, 0);
    }

    #[test]
    fn settle_replaces_both_sides() {
        let mut ctx = context();

        ctx.settle(Settlement::Resolved(vec![1]));
        assert_eq!(ctx.response(), Some(&vec![1]));
        assert!(ctx.error().is_none());

        ctx.settle(Settlement::Rejected("boom".to_string()));
        assert!(ctx.response().is_none());
        assert_eq!(ctx.error().map(String::as_str), Some("boom"));

        ctx.settle(Settlement::Resolved(vec![2]));
        assert_eq!(ctx.response(), Some(&vec![2]));
        assert!(ctx.error().is_none());
    }

    #[test]
    fn project_requires_a_response() {
        let mut ctx = context();
        assert!(!ctx.project(|mut xs| {
            xs.push(1);
            xs
        }));
        assert!(ctx.response().is_none());

        ctx.settle(Settlement::Resolved(vec![1, 2, 3]));
        assert!(ctx.project(|mut xs| {
            xs.push(4);
            xs
        }));
        assert_eq!(ctx.response(), Some(&vec![1, 2, 3, 4]));
    }
}
