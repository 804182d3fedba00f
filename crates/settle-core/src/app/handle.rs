//! Cloneable client side of a running machine.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::machine::Command;
use crate::domain::{BackgroundPayload, Data, Event, MachineState, Payload, Snapshot};
use crate::error::SettleError;

/// Handle to a machine actor.
///
/// Every method that sends an event resolves once the actor has applied it
/// (not when the resulting execution settles). Use `settled` or `subscribe`
/// to observe the outcome.
///
/// The actor stops once the last handle is dropped.
pub struct MachineHandle<D, E, P> {
    id: Arc<str>,
    commands: mpsc::Sender<Command<D, P>>,
    snapshots: watch::Receiver<Snapshot<D, E, P>>,
}

impl<D, E, P> Clone for MachineHandle<D, E, P> {
    fn clone(&self) -> Self {
        Self {
            id: Arc::clone(&self.id),
            commands: self.commands.clone(),
            snapshots: self.snapshots.clone(),
        }
    }
}

impl<D: Data, E: Data, P: Payload> MachineHandle<D, E, P> {
    pub(crate) fn new(
        id: Arc<str>,
        commands: mpsc::Sender<Command<D, P>>,
        snapshots: watch::Receiver<Snapshot<D, E, P>>,
    ) -> Self {
        Self { id, commands, snapshots }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send any event and wait for the actor to accept or refuse it.
    pub async fn send(&self, event: Event<D, P>) -> Result<(), SettleError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Dispatch { event, reply })
            .await
            .map_err(|_| SettleError::Closed)?;
        rx.await.map_err(|_| SettleError::Closed)?
    }

    /// FETCH: start a foreground execution with `payload`.
    pub async fn fetch(&self, payload: P) -> Result<(), SettleError> {
        self.send(Event::fetch(payload)).await
    }

    /// FETCH_BG: refetch in the background, keeping the current response
    /// visible until the new one settles.
    pub async fn refetch(&self, payload: BackgroundPayload<P>) -> Result<(), SettleError> {
        self.send(Event::fetch_background(payload)).await
    }

    /// UPDATE: replace the current response locally.
    pub async fn update(
        &self,
        transform: impl FnOnce(D) -> D + Send + 'static,
    ) -> Result<(), SettleError> {
        self.send(Event::update(transform)).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Snapshot<D, E, P> {
        self.snapshots.borrow().clone()
    }

    pub fn state(&self) -> MachineState {
        self.snapshots.borrow().state
    }

    /// Receiver that sees every snapshot published from now on.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<D, E, P>> {
        let mut rx = self.snapshots.clone();
        rx.mark_unchanged();
        rx
    }

    /// Wait until the machine is Resolved or Rejected and return that
    /// snapshot. Returns immediately if it already is.
    pub async fn settled(&self) -> Result<Snapshot<D, E, P>, SettleError> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|s| s.state.is_settled())
            .await
            .map_err(|_| SettleError::Closed)?;
        Ok(snapshot.clone())
    }
}
