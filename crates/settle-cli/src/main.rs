//! settle - todo demo for settle-core.
//!
//! Runs three machines (list / create / update) against a flaky in-memory
//! todo API and prints what each step leaves behind.

mod executors;
mod todo;

use std::fmt::Debug;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use eyre::{Result, WrapErr, bail};
use serde_json::json;
use settle_core::{
    BackgroundPayload, FnHooks, MachineBuilder, MachineHandle, MachineState, RefetchFailure,
    RetryOverrides, Snapshot,
};
use tokio::time::timeout;
use tracing::{info, warn};
use ulid::Ulid;

use crate::executors::{CreateTodo, ListTodos, UpdateTodo};
use crate::todo::{ApiError, ListQuery, NewTodo, Todo, TodoApi, TodoPatch};

type TodoList = MachineHandle<Vec<Todo>, ApiError, ListQuery>;
type ListSnapshot = Snapshot<Vec<Todo>, ApiError, ListQuery>;

const LIST_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "settle", version, about = "Retrying task orchestrator demo")]
struct Cli {
    /// Number of API calls that fail before the API starts answering
    #[arg(long, default_value_t = 2)]
    fail_first: u32,

    /// Probability (0 to 1) that any later call fails
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Simulated API latency in milliseconds
    #[arg(long, default_value_t = 50)]
    latency_ms: u64,

    /// Disable retries
    #[arg(long)]
    no_retry: bool,

    /// Retries after the first failure
    #[arg(long, default_value_t = 3)]
    retry_count: u32,

    /// Fixed delay between retries in milliseconds
    #[arg(long, default_value_t = 200)]
    retry_delay_ms: u64,

    /// Keep the previous list when a background refetch fails
    #[arg(long)]
    keep_on_refetch_failure: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| eyre::eyre!("failed to install tracing subscriber: {e}"))?;

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let api = TodoApi::new(cli.fail_first, cli.failure_rate, Duration::from_millis(cli.latency_ms));
    api.seed(seed_todos()).await;

    let overrides = RetryOverrides {
        retry_enabled: Some(!cli.no_retry),
        retry_count: Some(cli.retry_count),
        retry_delay_ms: Some(cli.retry_delay_ms),
    };
    let refetch_failure = if cli.keep_on_refetch_failure {
        RefetchFailure::KeepResponse
    } else {
        RefetchFailure::DiscardResponse
    };

    let todos: TodoList = MachineBuilder::<Vec<Todo>, ApiError, ListQuery>::new("todos")
        .options(overrides.clone())
        .refetch_failure(refetch_failure)
        .executor(ListTodos::new(api.clone()))
        .build()
        .wrap_err("failed to build todos machine")?;

    let create = MachineBuilder::<Todo, ApiError, NewTodo>::new("create-todo")
        .options(overrides.clone())
        .executor(CreateTodo::new(api.clone()))
        .hooks(refresh_on_success(&todos))
        .build()
        .wrap_err("failed to build create-todo machine")?;

    let update = MachineBuilder::<Todo, ApiError, TodoPatch>::new("update-todo")
        .options(overrides)
        .executor(UpdateTodo::new(api.clone()))
        .hooks(refresh_on_success(&todos))
        .build()
        .wrap_err("failed to build update-todo machine")?;

    // 1) initial load
    todos.fetch(ListQuery::default()).await?;
    let snapshot = todos.settled().await?;
    report("initial load", &snapshot);
    if snapshot.state == MachineState::Rejected {
        bail!("could not load todos");
    }

    // 2) create; the hook refreshes the list
    create
        .fetch(NewTodo {
            title: "Write the release notes".to_string(),
            description: Some("Cover the retry options".to_string()),
            due_date: Utc::now() + chrono::Duration::days(2),
            is_completed: false,
        })
        .await?;
    let created = create.settled().await?;
    let Some(todo) = created.response().cloned() else {
        bail!("create failed: {:?}", created.error());
    };
    println!("created {} ({})", todo.title, todo.id);
    let id = todo.id;
    let snapshot = wait_for_list(&todos, move |list| list.iter().any(|t| t.id == id)).await?;
    report("after create", &snapshot);

    // 3) toggle completion; the hook refreshes the list again
    update.fetch(TodoPatch::completion(id, !todo.is_completed)).await?;
    let toggled = update.settled().await?;
    match toggled.response() {
        Some(t) => println!("toggled {} -> completed={}", t.title, t.is_completed),
        None => bail!("toggle failed: {:?}", toggled.error()),
    }
    let snapshot =
        wait_for_list(&todos, move |list| list.iter().any(|t| t.id == id && t.is_completed)).await?;
    report("after toggle", &snapshot);

    // 4) background refetch with a partial payload
    if todos.state() == MachineState::Resolved {
        todos
            .refetch(BackgroundPayload::partial(json!({ "hide_completed": true })))
            .await?;
        let during = todos.snapshot();
        println!(
            "refetching in background: state={} still showing {} todos",
            during.state,
            during.response().map_or(0, Vec::len)
        );
        let snapshot = todos.settled().await?;
        report("open todos", &snapshot);
    } else {
        warn!(state = %todos.state(), "skipping background refetch");
    }

    // 5) optimistic local update
    if todos.state() == MachineState::Resolved {
        let draft = draft_todo("Plan the next iteration");
        todos
            .update(move |mut list| {
                list.insert(0, draft);
                list
            })
            .await?;
        report("optimistic update", &todos.snapshot());
    } else {
        warn!(state = %todos.state(), "skipping optimistic update");
    }

    Ok(())
}

/// Hooks that foreground-fetch the list whenever the owning machine resolves.
fn refresh_on_success<D: Debug, P: Debug>(todos: &TodoList) -> FnHooks<D, ApiError, P> {
    let todos = todos.clone();
    FnHooks::new().on_resolved(move |_, _| {
        let todos = todos.clone();
        tokio::spawn(async move {
            if let Err(e) = todos.fetch(ListQuery::default()).await {
                warn!(machine = todos.id(), error = %e, "list refresh refused");
            }
        });
    })
}

/// Wait until the list resolves with `done(list)` true, or rejects.
async fn wait_for_list(todos: &TodoList, done: impl Fn(&[Todo]) -> bool) -> Result<ListSnapshot> {
    let mut rx = todos.subscribe();
    let waiting = rx.wait_for(|s| match s.state {
        MachineState::Rejected => true,
        MachineState::Resolved => s.response().is_some_and(|list| done(list.as_slice())),
        _ => false,
    });
    let snapshot = timeout(LIST_WAIT, waiting)
        .await
        .wrap_err("timed out waiting for the todo list")?
        .wrap_err("todo list machine stopped")?;
    Ok(snapshot.clone())
}

fn report(label: &str, snapshot: &ListSnapshot) {
    println!(
        "== {label}: state={} retry_attempts={}",
        snapshot.state,
        snapshot.context.meta().retry_attempts
    );
    if let Some(list) = snapshot.response() {
        for t in list {
            println!(
                "  [{}] {:<32} due {}  {}",
                if t.is_completed { 'x' } else { ' ' },
                t.title,
                t.due_date.format("%Y-%m-%d"),
                t.id
            );
        }
    }
    if let Some(error) = snapshot.error() {
        println!("  error: {error}");
    }
}

fn seed_todos() -> Vec<NewTodo> {
    vec![
        NewTodo {
            title: "Review open pull requests".to_string(),
            description: None,
            due_date: Utc::now() + chrono::Duration::days(1),
            is_completed: false,
        },
        NewTodo {
            title: "Rotate API keys".to_string(),
            description: Some("Staging first".to_string()),
            due_date: Utc::now() + chrono::Duration::days(5),
            is_completed: true,
        },
    ]
}

/// Local-only todo shown before the server knows about it.
fn draft_todo(title: &str) -> Todo {
    let now = Utc::now();
    Todo {
        id: Ulid::new(),
        title: format!("(draft) {title}"),
        description: None,
        due_date: now + chrono::Duration::days(7),
        is_completed: false,
        completed_on: None,
        created_at: now,
        updated_at: now,
    }
}
