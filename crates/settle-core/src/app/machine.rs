//! MachineActor - runs one machine on its own tokio task.
//!
//! # Flow
//! 1. Receive a command (caller event) or a unit settlement
//! 2. Feed it to `StateMachine::apply`
//! 3. Carry out the effects (spawn / abort units, run hooks)
//! 4. Publish a snapshot to the watch channel
//!
//! Commands are processed strictly in arrival order. Only one unit task is
//! owned at a time; spawning a new one aborts the previous one. A unit that
//! panics is reported as a crash and the machine falls back to the state the
//! unit started from.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::execution::ExecutionUnit;
use crate::domain::{
    Data, Effect, Event, Input, Payload, RetryOptions, Snapshot, StateMachine, UnitReport,
};
use crate::error::SettleError;
use crate::ports::{MachineHooks, TaskExecutor};

/// Requests sent from a `MachineHandle` to the actor.
pub(crate) enum Command<D, P> {
    Dispatch {
        event: Event<D, P>,
        reply: oneshot::Sender<Result<(), SettleError>>,
    },
}

/// How a unit task ended.
pub(crate) enum UnitExit<D, E> {
    Settled(UnitReport<D, E>),
    Panicked(String),
}

pub(crate) type Settled<D, E> = (u64, UnitExit<D, E>);

pub(crate) struct MachineActor<D, E, P> {
    id: Arc<str>,
    core: StateMachine<D, E, P>,
    options: Arc<RetryOptions>,
    executor: Arc<dyn TaskExecutor<P, D, E>>,
    hooks: Arc<dyn MachineHooks<D, E, P>>,
    snapshots: watch::Sender<Snapshot<D, E, P>>,
    settled_tx: mpsc::UnboundedSender<Settled<D, E>>,
    current: Option<JoinHandle<()>>,
}

impl<D: Data, E: Data, P: Payload> MachineActor<D, E, P> {
    pub(crate) fn new(
        id: Arc<str>,
        core: StateMachine<D, E, P>,
        options: Arc<RetryOptions>,
        executor: Arc<dyn TaskExecutor<P, D, E>>,
        hooks: Arc<dyn MachineHooks<D, E, P>>,
        snapshots: watch::Sender<Snapshot<D, E, P>>,
        settled_tx: mpsc::UnboundedSender<Settled<D, E>>,
    ) -> Self {
        Self {
            id,
            core,
            options,
            executor,
            hooks,
            snapshots,
            settled_tx,
            current: None,
        }
    }

    /// Event loop. Ends when every handle has been dropped.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command<D, P>>,
        mut settled_rx: mpsc::UnboundedReceiver<Settled<D, E>>,
    ) {
        info!(machine = %self.id, policy = ?self.core.policy(), "machine started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Dispatch { event, reply }) => {
                        let result = self.dispatch(event);
                        // caller may have stopped waiting
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                Some((generation, exit)) = settled_rx.recv() => match exit {
                    UnitExit::Settled(report) => self.settle(generation, report),
                    UnitExit::Panicked(message) => self.crashed(generation, &message),
                },
            }
        }

        if let Some(unit) = self.current.take() {
            unit.abort();
        }
        info!(machine = %self.id, "machine stopped");
    }

    fn dispatch(&mut self, event: Event<D, P>) -> Result<(), SettleError> {
        let kind = event.kind();
        let from = self.core.state();
        let effects = match self.core.apply(Input::Event(event)) {
            Ok(effects) => effects,
            Err(e) => {
                warn!(
                    machine = %self.id,
                    event = %kind,
                    state = %from,
                    error = %e,
                    "event refused"
                );
                return Err(e);
            }
        };
        debug!(
            machine = %self.id,
            event = %kind,
            from = %from,
            to = %self.core.state(),
            "event accepted"
        );

        self.run_effects(effects);
        self.publish();
        Ok(())
    }

    fn settle(&mut self, generation: u64, report: UnitReport<D, E>) {
        if !self.core.is_current(generation) {
            debug!(
                machine = %self.id,
                generation,
                current = self.core.generation(),
                "dropping stale settlement"
            );
            return;
        }
        self.current = None;

        let from = self.core.state();
        let invocations = report.invocations;
        match self.core.apply(Input::Settled { generation, report }) {
            Ok(effects) => {
                info!(
                    machine = %self.id,
                    generation,
                    invocations,
                    from = %from,
                    to = %self.core.state(),
                    "execution settled"
                );
                self.run_effects(effects);
                self.publish();
            }
            Err(e) => warn!(machine = %self.id, generation, error = %e, "settlement not applied"),
        }
    }

    fn crashed(&mut self, generation: u64, message: &str) {
        if !self.core.is_current(generation) {
            debug!(machine = %self.id, generation, "dropping stale unit panic");
            return;
        }
        self.current = None;

        let from = self.core.state();
        match self.core.apply(Input::Crashed { generation }) {
            Ok(_) => {
                error!(
                    machine = %self.id,
                    generation,
                    panic = %message,
                    from = %from,
                    to = %self.core.state(),
                    "execution unit panicked"
                );
                self.publish();
            }
            Err(e) => warn!(machine = %self.id, generation, error = %e, "crash not applied"),
        }
    }

    fn run_effects(&mut self, effects: Vec<Effect<D, E, P>>) {
        for effect in effects {
            match effect {
                Effect::Spawn { generation, payload } => self.spawn_unit(generation, payload),
                Effect::NotifySuccess { data, payload } => {
                    self.hooks.on_success(&self.id, &data, &payload)
                }
                Effect::NotifyError { error, payload } => {
                    self.hooks.on_error(&self.id, &error, &payload)
                }
            }
        }
    }

    fn spawn_unit(&mut self, generation: u64, payload: P) {
        if let Some(previous) = self.current.take() {
            previous.abort();
            debug!(machine = %self.id, generation, "superseded execution unit aborted");
        }

        let unit =
            ExecutionUnit::new(Arc::clone(&self.executor), Arc::clone(&self.options), payload)
                .labelled(Arc::clone(&self.id), generation);
        let settled_tx = self.settled_tx.clone();
        self.current = Some(tokio::spawn(async move {
            let exit = match AssertUnwindSafe(unit.run()).catch_unwind().await {
                Ok(report) => UnitExit::Settled(report),
                Err(panic) => UnitExit::Panicked(panic_message(&*panic)),
            };
            // actor gone means nobody cares about the result
            let _ = settled_tx.send((generation, exit));
        }));
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.core.snapshot());
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
