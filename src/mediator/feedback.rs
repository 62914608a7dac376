use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{Permission, Viewer};
use crate::db;
use crate::error::AppError;
use crate::models::Feedback;

use super::{ReadPolicy, expect_affected, rows_or_empty};

#[instrument(skip(pool, viewer))]
pub async fn list(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    policy: ReadPolicy,
) -> Result<Vec<Feedback>, AppError> {
    let scope = policy.scope(viewer)?;
    let feedback = rows_or_empty(db::list_feedback(pool).await, "feedback");

    Ok(match scope.owner() {
        Some(owner) => feedback
            .into_iter()
            .filter(|entry| entry.user_id == owner)
            .collect(),
        None => feedback,
    })
}

/// Write-once; the author's email and username are captured as they are now.
#[instrument(skip(pool, viewer, message))]
pub async fn create(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    message: &str,
    now: DateTime<Utc>,
) -> Result<Feedback, AppError> {
    let identity = viewer.require_permission(Permission::SendFeedback)?;
    let message = message.trim();

    if message.is_empty() {
        return Err(AppError::Validation("Feedback cannot be empty".to_string()));
    }

    let username = viewer.display_username();
    let id = db::insert_feedback(pool, &identity.id, &identity.email, &username, message, now)
        .await?;
    info!(id, "Received feedback");

    Ok(Feedback {
        id,
        user_id: identity.id.clone(),
        email: identity.email.clone(),
        username,
        message: message.to_string(),
        created_at: now,
    })
}

#[instrument(skip(pool, viewer))]
pub async fn delete(pool: &Pool<Sqlite>, viewer: &Viewer, id: i64) -> Result<(), AppError> {
    viewer.require_permission(Permission::ReviewFeedback)?;

    if db::get_feedback(pool, id).await?.is_none() {
        return Err(AppError::NotFound(format!("feedback {}", id)));
    }

    expect_affected(db::delete_feedback(pool, id).await?, "feedback", id)?;
    info!(id, "Deleted feedback");
    Ok(())
}
