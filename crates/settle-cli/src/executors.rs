//! `TaskExecutor` adapters over `TodoApi`, one per machine.

use async_trait::async_trait;
use settle_core::TaskExecutor;

use crate::todo::{ApiError, ListQuery, NewTodo, Todo, TodoApi, TodoPatch};

pub struct ListTodos {
    api: TodoApi,
}

impl ListTodos {
    pub fn new(api: TodoApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TaskExecutor<ListQuery, Vec<Todo>, ApiError> for ListTodos {
    async fn execute(&self, query: &ListQuery) -> Result<Vec<Todo>, ApiError> {
        self.api.list(query).await
    }
}

pub struct CreateTodo {
    api: TodoApi,
}

impl CreateTodo {
    pub fn new(api: TodoApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TaskExecutor<NewTodo, Todo, ApiError> for CreateTodo {
    async fn execute(&self, new: &NewTodo) -> Result<Todo, ApiError> {
        self.api.create(new).await
    }
}

pub struct UpdateTodo {
    api: TodoApi,
}

impl UpdateTodo {
    pub fn new(api: TodoApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TaskExecutor<TodoPatch, Todo, ApiError> for UpdateTodo {
    async fn execute(&self, patch: &TodoPatch) -> Result<Todo, ApiError> {
        self.api.update(patch).await
    }
}
