//! ExecutionUnit - one attempt-and-retry cycle.
//!
//! # Flow
//! 1. Default: invoke the executor with the payload
//! 2. Success -> Done(Resolved)
//! 3. Failure + retry guard false -> Done(Rejected)
//! 4. Failure + retry guard true -> Retry: wait `retry_delay`, bump the
//!    attempt counter, back to 1 with the same payload

use std::sync::Arc;

use tokio::time::sleep;
use tracing::debug;

use crate::domain::{RetryOptions, Settlement, UnitReport};
use crate::ports::TaskExecutor;

/// State of an execution unit.
///
/// Done is terminal and carries the sealed outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState<D, E> {
    Default,
    Retry,
    Done(Settlement<D, E>),
}

/// Single-use retry loop around one executor call.
///
/// A unit holds nothing beyond its own cycle: the payload, the attempt
/// counter and a handle on the machine's options. Dropping the future
/// returned by `run` cancels it, including a pending retry delay.
pub struct ExecutionUnit<P, D, E> {
    executor: Arc<dyn TaskExecutor<P, D, E>>,
    options: Arc<RetryOptions>,
    payload: P,
    state: UnitState<D, E>,
    retry_attempts: u32,
    invocations: u32,
    label: Arc<str>,
    generation: u64,
}

impl<P, D, E> ExecutionUnit<P, D, E>
where
    P: Send + Sync + 'static,
    D: Send + 'static,
    E: Send + 'static,
{
    /// Create a unit seeded with `payload` and zero attempts.
    pub fn new(
        executor: Arc<dyn TaskExecutor<P, D, E>>,
        options: Arc<RetryOptions>,
        payload: P,
    ) -> Self {
        Self {
            executor,
            options,
            payload,
            state: UnitState::Default,
            retry_attempts: 0,
            invocations: 0,
            label: Arc::from("unit"),
            generation: 0,
        }
    }

    /// Tag log lines with the owning machine and spawn generation.
    pub fn labelled(mut self, machine: Arc<str>, generation: u64) -> Self {
        self.label = machine;
        self.generation = generation;
        self
    }

    /// Drive the unit until it settles.
    pub async fn run(mut self) -> UnitReport<D, E> {
        loop {
            match std::mem::replace(&mut self.state, UnitState::Default) {
                UnitState::Default => self.state = self.attempt().await,
                UnitState::Retry => {
                    sleep(self.options.retry_delay).await;
                    self.retry_attempts += 1;
                }
                UnitState::Done(settlement) => {
                    debug_assert!(self.invocations <= self.options.max_invocations());
                    debug!(
                        machine = %self.label,
                        generation = self.generation,
                        resolved = settlement.is_resolved(),
                        retry_attempts = self.retry_attempts,
                        "execution unit settled"
                    );
                    return UnitReport {
                        settlement,
                        retry_attempts: self.retry_attempts,
                        invocations: self.invocations,
                    };
                }
            }
        }
    }

    /// One executor call; returns the next state.
    async fn attempt(&mut self) -> UnitState<D, E> {
        self.invocations += 1;
        debug!(
            machine = %self.label,
            generation = self.generation,
            attempt = self.retry_attempts,
            "invoking task executor"
        );

        match self.executor.execute(&self.payload).await {
            Ok(response) => UnitState::Done(Settlement::Resolved(response)),
            Err(_) if self.options.allows_retry(self.retry_attempts) => {
                debug!(
                    machine = %self.label,
                    generation = self.generation,
                    attempt = self.retry_attempts,
                    retry_count = self.options.retry_count,
                    delay = ?self.options.retry_delay,
                    "attempt failed, retry scheduled"
                );
                UnitState::Retry
            }
            Err(error) => UnitState::Done(Settlement::Rejected(error)),
        }
    }
}
