//! Task metadata kept in the machine context.

use std::sync::Arc;

use super::options::RetryOptions;

/// Bookkeeping for the current (or last) execution cycle.
///
/// Design:
/// - `payload` is the input of the most recent fetch; background refetches
///   derive their input from it.
/// - `retry_attempts` is reset whenever a new top-level fetch begins and holds
///   the number of retries the last settled cycle took.
/// - `options` is the machine's shared, immutable retry configuration.
#[derive(Debug, Clone)]
pub struct TaskMeta<P> {
    pub retry_attempts: u32,
    pub payload: Option<P>,
    pub options: Arc<RetryOptions>,
}

impl<P> TaskMeta<P> {
    pub fn new(options: Arc<RetryOptions>) -> Self {
        Self {
            retry_attempts: 0,
            payload: None,
            options,
        }
    }

    /// Start a new cycle with `payload` (attempts reset).
    pub fn begin(&mut self, payload: P) {
        self.payload = Some(payload);
        self.retry_attempts = 0;
    }
}
