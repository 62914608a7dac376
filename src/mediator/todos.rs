use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::auth::{Permission, Viewer, can_edit_resource};
use crate::db;
use crate::error::AppError;
use crate::models::{Priority, Todo};

use super::{ReadPolicy, expect_affected, rows_or_empty};

#[derive(Debug, Clone)]
pub struct TodoDraft {
    pub title: String,
    pub description: Option<String>,
    pub deadline: DateTime<Utc>,
    pub priority: Priority,
}

impl TodoDraft {
    fn title(&self) -> Result<&str, AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            Err(AppError::Validation("Title cannot be empty".to_string()))
        } else {
            Ok(title)
        }
    }

    fn description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|description| !description.is_empty())
    }
}

async fn fetch_existing(pool: &Pool<Sqlite>, id: i64) -> Result<Todo, AppError> {
    db::get_todo(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("todo {}", id)))
}

async fn fetch_editable(pool: &Pool<Sqlite>, viewer: &Viewer, id: i64) -> Result<Todo, AppError> {
    let identity = viewer.require_identity()?;
    let todo = fetch_existing(pool, id).await?;

    if can_edit_resource(&todo, identity) {
        Ok(todo)
    } else {
        warn!(identity_id = %identity.id, id, "Refusing to edit another user's todo");
        Err(AppError::Authorization(format!("todo {} belongs to another user", id)))
    }
}

/// Ordered by deadline, earliest first.
#[instrument(skip(pool, viewer))]
pub async fn list(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    policy: ReadPolicy,
) -> Result<Vec<Todo>, AppError> {
    let scope = policy.scope(viewer)?;
    Ok(rows_or_empty(db::list_todos(pool, scope.owner()).await, "todos"))
}

#[instrument(skip(pool, viewer, draft))]
pub async fn create(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    draft: TodoDraft,
) -> Result<Todo, AppError> {
    let identity = viewer.require_permission(Permission::ManageOwnTodos)?;

    let id = db::insert_todo(
        pool,
        &identity.id,
        draft.title()?,
        draft.description(),
        draft.deadline,
        draft.priority,
    )
    .await?;

    info!(id, "Created todo");
    fetch_existing(pool, id).await
}

#[instrument(skip(pool, viewer, draft))]
pub async fn update(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    id: i64,
    draft: TodoDraft,
) -> Result<Todo, AppError> {
    fetch_editable(pool, viewer, id).await?;

    let rows = db::update_todo(
        pool,
        id,
        draft.title()?,
        draft.description(),
        draft.deadline,
        draft.priority,
    )
    .await?;
    expect_affected(rows, "todo", id)?;

    fetch_existing(pool, id).await
}

/// Flips the done flag.
#[instrument(skip(pool, viewer))]
pub async fn toggle(pool: &Pool<Sqlite>, viewer: &Viewer, id: i64) -> Result<Todo, AppError> {
    let todo = fetch_editable(pool, viewer, id).await?;

    expect_affected(db::set_todo_done(pool, id, !todo.done).await?, "todo", id)?;

    Ok(Todo {
        done: !todo.done,
        ..todo
    })
}

/// Only the owner may delete; admins get no override on todos.
#[instrument(skip(pool, viewer))]
pub async fn delete(pool: &Pool<Sqlite>, viewer: &Viewer, id: i64) -> Result<(), AppError> {
    fetch_editable(pool, viewer, id).await?;

    expect_affected(db::delete_todo(pool, id).await?, "todo", id)?;
    info!(id, "Deleted todo");
    Ok(())
}
