//! Caller events.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::payload::{Payload, merge_partial};
use crate::error::SettleError;

/// Local transform applied to the current response by `Event::Update`.
pub type Transform<D> = Box<dyn FnOnce(D) -> D + Send>;

/// How a background refetch computes its payload from the stored one.
pub enum BackgroundPayload<P> {
    /// Reuse the stored payload verbatim.
    Reuse,

    /// Use this payload as is.
    Literal(P),

    /// Shallow-merge this JSON object over the stored payload.
    Partial(serde_json::Value),

    /// Compute the next payload from the stored one.
    Derive(Box<dyn FnOnce(&P) -> P + Send>),
}

impl<P> BackgroundPayload<P> {
    pub fn partial(patch: serde_json::Value) -> Self {
        BackgroundPayload::Partial(patch)
    }

    pub fn derive(f: impl FnOnce(&P) -> P + Send + 'static) -> Self {
        BackgroundPayload::Derive(Box::new(f))
    }
}

impl<P: Payload> BackgroundPayload<P> {
    /// Resolve against the stored payload.
    pub fn resolve(self, current: &P) -> Result<P, SettleError> {
        match self {
            BackgroundPayload::Reuse => Ok(current.clone()),
            BackgroundPayload::Literal(payload) => Ok(payload),
            BackgroundPayload::Partial(patch) => merge_partial(current, patch),
            BackgroundPayload::Derive(f) => Ok(f(current)),
        }
    }
}

impl<P> Default for BackgroundPayload<P> {
    fn default() -> Self {
        BackgroundPayload::Reuse
    }
}

impl<P: fmt::Debug> fmt::Debug for BackgroundPayload<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundPayload::Reuse => f.write_str("Reuse"),
            BackgroundPayload::Literal(payload) => f.debug_tuple("Literal").field(payload).finish(),
            BackgroundPayload::Partial(patch) => f.debug_tuple("Partial").field(patch).finish(),
            BackgroundPayload::Derive(_) => f.write_str("Derive(<fn>)"),
        }
    }
}

/// Events a caller can send to a machine.
pub enum Event<D, P> {
    /// Foreground fetch: (re)start execution with `payload`.
    Fetch { payload: P },

    /// Background refetch from Resolved.
    FetchBackground { payload: BackgroundPayload<P> },

    /// Replace the response locally while Resolved.
    Update { transform: Transform<D> },
}

impl<D, P> Event<D, P> {
    pub fn fetch(payload: P) -> Self {
        Event::Fetch { payload }
    }

    pub fn fetch_background(payload: BackgroundPayload<P>) -> Self {
        Event::FetchBackground { payload }
    }

    pub fn update(transform: impl FnOnce(D) -> D + Send + 'static) -> Self {
        Event::Update {
            transform: Box::new(transform),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Fetch { .. } => EventKind::Fetch,
            Event::FetchBackground { .. } => EventKind::FetchBackground,
            Event::Update { .. } => EventKind::Update,
        }
    }
}

impl<D, P: fmt::Debug> fmt::Debug for Event<D, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Fetch { payload } => f.debug_struct("Fetch").field("payload", payload).finish(),
            Event::FetchBackground { payload } => f
                .debug_struct("FetchBackground")
                .field("payload", payload)
                .finish(),
            Event::Update { .. } => f.write_str("Update { transform: <fn> }"),
        }
    }
}

/// Event tag, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Fetch,
    #[serde(rename = "FETCH_BG")]
    FetchBackground,
    Update,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Fetch => "FETCH",
            EventKind::FetchBackground => "FETCH_BG",
            EventKind::Update => "UPDATE",
        };
        f.write_str(s)
    }
}
