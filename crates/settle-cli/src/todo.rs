//! In-memory todo API used by the demo.
//!
//! Each call sleeps for `latency` and can fail on purpose: the first
//! `fail_first` calls always fail, after that each call fails with
//! probability `failure_rate`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Ulid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub is_completed: bool,
    pub completed_on: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub is_completed: bool,
}

/// Update payload: `id` plus the fields to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoPatch {
    pub id: Ulid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_completed: Option<bool>,
}

impl TodoPatch {
    pub fn completion(id: Ulid, is_completed: bool) -> Self {
        Self {
            id,
            title: None,
            description: None,
            due_date: None,
            is_completed: Some(is_completed),
        }
    }
}

/// List query. Kept as a flat object so a background refetch can patch it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub hide_completed: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("todo {0} not found")]
    NotFound(Ulid),

    #[error("invalid todo: {0}")]
    Invalid(String),

    #[error("service unavailable (injected failure)")]
    Unavailable,
}

struct Inner {
    todos: Mutex<Vec<Todo>>,
    remaining_failures: AtomicU32,
    failure_rate: f64,
    latency: Duration,
}

#[derive(Clone)]
pub struct TodoApi {
    inner: Arc<Inner>,
}

impl TodoApi {
    pub fn new(fail_first: u32, failure_rate: f64, latency: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                todos: Mutex::new(Vec::new()),
                remaining_failures: AtomicU32::new(fail_first),
                failure_rate: failure_rate.clamp(0.0, 1.0),
                latency,
            }),
        }
    }

    /// Insert todos directly, bypassing latency and failure injection.
    pub async fn seed(&self, todos: impl IntoIterator<Item = NewTodo>) {
        let mut store = self.inner.todos.lock().await;
        for new in todos {
            store.push(Todo::from_new(new, Utc::now()));
        }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Todo>, ApiError> {
        self.call().await?;
        let store = self.inner.todos.lock().await;
        let mut todos: Vec<Todo> = store
            .iter()
            .filter(|t| !(query.hide_completed && t.is_completed))
            .cloned()
            .collect();
        todos.sort_by_key(|t| t.due_date);
        if let Some(limit) = query.limit {
            todos.truncate(limit);
        }
        Ok(todos)
    }

    pub async fn create(&self, new: &NewTodo) -> Result<Todo, ApiError> {
        self.call().await?;
        if new.title.trim().is_empty() {
            return Err(ApiError::Invalid("title must not be empty".to_string()));
        }
        let todo = Todo::from_new(new.clone(), Utc::now());
        self.inner.todos.lock().await.push(todo.clone());
        Ok(todo)
    }

    pub async fn update(&self, patch: &TodoPatch) -> Result<Todo, ApiError> {
        self.call().await?;
        let mut store = self.inner.todos.lock().await;
        let todo = store
            .iter_mut()
            .find(|t| t.id == patch.id)
            .ok_or(ApiError::NotFound(patch.id))?;

        let now = Utc::now();
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(ApiError::Invalid("title must not be empty".to_string()));
            }
            todo.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            todo.description = Some(description.clone());
        }
        if let Some(due_date) = patch.due_date {
            todo.due_date = due_date;
        }
        if let Some(is_completed) = patch.is_completed {
            if is_completed != todo.is_completed {
                todo.is_completed = is_completed;
                todo.completed_on = is_completed.then_some(now);
            }
        }
        todo.updated_at = now;
        Ok(todo.clone())
    }

    /// Simulated network round trip.
    async fn call(&self) -> Result<(), ApiError> {
        sleep(self.inner.latency).await;
        let injected = self
            .inner
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected || self.roll_failure() {
            return Err(ApiError::Unavailable);
        }
        Ok(())
    }

    fn roll_failure(&self) -> bool {
        self.inner.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.inner.failure_rate)
    }
}

impl Todo {
    fn from_new(new: NewTodo, now: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new(),
            title: new.title.trim().to_string(),
            description: new.description,
            due_date: new.due_date,
            is_completed: new.is_completed,
            completed_on: new.is_completed.then_some(now),
            created_at: now,
            updated_at: now,
        }
    }
}
