//! Settlement: the sealed result of one execution unit.

use serde::{Deserialize, Serialize};

/// Outcome of one attempt-and-retry cycle.
///
/// A response or an error, never both. The enum makes the mutual exclusivity
/// a property of the type instead of something to check at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Settlement<D, E> {
    Resolved(D),
    Rejected(E),
}

impl<D, E> Settlement<D, E> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Settlement::Resolved(_))
    }

    pub fn response(&self) -> Option<&D> {
        match self {
            Settlement::Resolved(response) => Some(response),
            Settlement::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Settlement::Resolved(_) => None,
            Settlement::Rejected(error) => Some(error),
        }
    }

    /// Split into the `{ response, error }` pair stored in the context.
    pub fn into_parts(self) -> (Option<D>, Option<E>) {
        match self {
            Settlement::Resolved(response) => (Some(response), None),
            Settlement::Rejected(error) => (None, Some(error)),
        }
    }
}

impl<D, E> From<Result<D, E>> for Settlement<D, E> {
    fn from(result: Result<D, E>) -> Self {
        match result {
            Ok(response) => Settlement::Resolved(response),
            Err(error) => Settlement::Rejected(error),
        }
    }
}

/// What an execution unit hands back to its machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport<D, E> {
    pub settlement: Settlement<D, E>,

    /// Retries taken before settling (0 when the first attempt settled it).
    pub retry_attempts: u32,

    /// Executor invocations, always `retry_attempts + 1`.
    pub invocations: u32,
}
