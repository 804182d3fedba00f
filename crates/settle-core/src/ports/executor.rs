//! TaskExecutor port - one payload in, one response or error out.

use std::future::Future;

use async_trait::async_trait;

/// The async operation a machine orchestrates.
///
/// # Contract
/// - Must not mutate its input (it only gets `&P`).
/// - Must eventually settle. The machine enforces no timeout of its own.
/// - Whatever it returns as `E` is stored verbatim as the machine's error.
///
/// # Example
/// ```ignore
/// struct GetTodos { api: TodoApi }
///
/// #[async_trait]
/// impl TaskExecutor<ListQuery, Vec<Todo>, ApiError> for GetTodos {
///     async fn execute(&self, query: &ListQuery) -> Result<Vec<Todo>, ApiError> {
///         self.api.list(query).await
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor<P, D, E>: Send + Sync {
    async fn execute(&self, payload: &P) -> Result<D, E>;
}

/// Adapts an async closure into a `TaskExecutor`.
///
/// The closure receives its own clone of the payload.
pub struct FnExecutor<F> {
    f: F,
}

pub fn executor_fn<F>(f: F) -> FnExecutor<F> {
    FnExecutor { f }
}

#[async_trait]
impl<P, D, E, F, Fut> TaskExecutor<P, D, E> for FnExecutor<F>
where
    P: Clone + Send + Sync + 'static,
    D: Send + 'static,
    E: Send + 'static,
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<D, E>> + Send + 'static,
{
    async fn execute(&self, payload: &P) -> Result<D, E> {
        (self.f)(payload.clone()).await
    }
}
