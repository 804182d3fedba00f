//! MachineBuilder - configure and spawn a machine.
//!
//! Validation happens in `build()` so a misconfigured machine never starts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::handle::MachineHandle;
use super::machine::MachineActor;
use crate::domain::{
    Data, InFlight, MachinePolicy, Payload, RefetchFailure, RetryOptions, RetryOverrides,
    StateMachine,
};
use crate::impls::TracingHooks;
use crate::ports::{MachineHooks, TaskExecutor};

/// Default bound of the command channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Builds one machine.
///
/// # Example
/// ```ignore
/// let todos = MachineBuilder::new("todos")
///     .retry_enabled(true)
///     .executor(ListTodos::new(api))
///     .build()?;
/// todos.fetch(Query::default()).await?;
/// ```
pub struct MachineBuilder<D, E, P> {
    id: String,
    overrides: RetryOverrides,
    policy: MachinePolicy,
    executor: Option<Arc<dyn TaskExecutor<P, D, E>>>,
    hooks: Option<Arc<dyn MachineHooks<D, E, P>>>,
    channel_capacity: usize,
}

/// Errors raised while building a machine.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("machine {0:?} has no task executor")]
    MissingExecutor(String),

    #[error("machine id must not be empty")]
    EmptyId,

    #[error("command channel capacity must be greater than zero")]
    ZeroCapacity,
}

impl<D: Data, E: Data, P: Payload> MachineBuilder<D, E, P> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            overrides: RetryOverrides::default(),
            policy: MachinePolicy::default(),
            executor: None,
            hooks: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Replace all retry overrides at once (e.g. from a config file).
    pub fn options(mut self, overrides: RetryOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn retry_enabled(mut self, enabled: bool) -> Self {
        self.overrides.retry_enabled = Some(enabled);
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.overrides.retry_count = Some(count);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.overrides.retry_delay_ms = Some(delay.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn executor(mut self, executor: impl TaskExecutor<P, D, E> + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Share an executor between machines.
    pub fn shared_executor(mut self, executor: Arc<dyn TaskExecutor<P, D, E>>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Success / error hooks. Defaults to `TracingHooks`.
    pub fn hooks(mut self, hooks: impl MachineHooks<D, E, P> + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn in_flight(mut self, in_flight: InFlight) -> Self {
        self.policy.in_flight = in_flight;
        self
    }

    pub fn refetch_failure(mut self, refetch_failure: RefetchFailure) -> Self {
        self.policy.refetch_failure = refetch_failure;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Validate and spawn the machine actor on the current tokio runtime.
    ///
    /// # Errors
    /// - `BuildError::EmptyId` if the id is blank
    /// - `BuildError::MissingExecutor` if no executor was set
    /// - `BuildError::ZeroCapacity` if the channel capacity is 0
    pub fn build(self) -> Result<MachineHandle<D, E, P>, BuildError> {
        if self.id.trim().is_empty() {
            return Err(BuildError::EmptyId);
        }
        let executor = self.executor.ok_or_else(|| BuildError::MissingExecutor(self.id.clone()))?;
        if self.channel_capacity == 0 {
            return Err(BuildError::ZeroCapacity);
        }

        let id: Arc<str> = Arc::from(self.id);
        let options = Arc::new(RetryOptions::resolve(&self.overrides));
        let hooks: Arc<dyn MachineHooks<D, E, P>> = match self.hooks {
            Some(hooks) => hooks,
            None => Arc::new(TracingHooks),
        };
        let core = StateMachine::new(Arc::clone(&options), self.policy);

        let (snapshot_tx, snapshot_rx) = watch::channel(core.snapshot());
        let (command_tx, command_rx) = mpsc::channel(self.channel_capacity);
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();

        tracing::debug!(
            machine = %id,
            retry_enabled = options.retry_enabled,
            retry_count = options.retry_count,
            retry_delay = ?options.retry_delay,
            policy = ?self.policy,
            "building machine"
        );

        let actor = MachineActor::new(
            Arc::clone(&id),
            core,
            options,
            executor,
            hooks,
            snapshot_tx,
            settled_tx,
        );
        tokio::spawn(actor.run(command_rx, settled_rx));

        Ok(MachineHandle::new(id, command_tx, snapshot_rx))
    }
}
