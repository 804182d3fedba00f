//! Bounds for the values a machine carries, and the shallow payload merge.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SettleError;

/// Responses and errors stored in a machine context.
///
/// # Trait Bounds
/// - `Clone`: snapshots are handed out to every observer
/// - `Debug`: the default hooks log them
/// - `Send + Sync + 'static`: they cross from the execution task into the actor
pub trait Data: fmt::Debug + Clone + Send + Sync + 'static {}

impl<T> Data for T where T: fmt::Debug + Clone + Send + Sync + 'static {}

/// Input handed to the task executor.
///
/// On top of `Data`, payloads round-trip through JSON so that a background
/// refetch can shallow-merge a partial object over the stored payload.
pub trait Payload: Data + Serialize + DeserializeOwned {}

impl<T> Payload for T where T: Data + Serialize + DeserializeOwned {}

/// Shallow merge: every top-level key of `patch` replaces the same key of
/// `current`. Nested objects are replaced, not merged.
pub fn merge_partial<P: Payload>(current: &P, patch: serde_json::Value) -> Result<P, SettleError> {
    let serde_json::Value::Object(patch) = patch else {
        return Err(SettleError::PayloadNotObject);
    };
    let mut value = serde_json::to_value(current)?;
    let Some(object) = value.as_object_mut() else {
        return Err(SettleError::PayloadNotObject);
    };
    for (key, field) in patch {
        object.insert(key, field);
    }
    Ok(serde_json::from_value(value)?)
}
