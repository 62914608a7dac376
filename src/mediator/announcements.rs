use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{Permission, Viewer};
use crate::db;
use crate::error::AppError;
use crate::models::Announcement;

use super::{ReadPolicy, expect_affected, rows_or_empty};

#[derive(Debug, Clone)]
pub struct AnnouncementDraft {
    pub title: String,
    pub content: String,
}

impl AnnouncementDraft {
    fn checked(&self) -> Result<(&str, &str), AppError> {
        let title = self.title.trim();
        let content = self.content.trim();

        if title.is_empty() || content.is_empty() {
            return Err(AppError::Validation(
                "Announcement needs a title and content".to_string(),
            ));
        }
        Ok((title, content))
    }
}

/// Newest first.
#[instrument(skip(pool, viewer))]
pub async fn list(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    policy: ReadPolicy,
) -> Result<Vec<Announcement>, AppError> {
    policy.scope(viewer)?;
    Ok(rows_or_empty(db::list_announcements(pool).await, "announcements"))
}

#[instrument(skip(pool, viewer, draft))]
pub async fn create(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    draft: AnnouncementDraft,
    now: DateTime<Utc>,
) -> Result<Announcement, AppError> {
    viewer.require_permission(Permission::ManageAnnouncements)?;
    let (title, content) = draft.checked()?;

    let id = db::insert_announcement(pool, title, content, now).await?;
    info!(id, "Published announcement");

    Ok(Announcement {
        id,
        title: title.to_string(),
        content: content.to_string(),
        created_at: now,
    })
}

#[instrument(skip(pool, viewer, draft))]
pub async fn update(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    id: i64,
    draft: AnnouncementDraft,
) -> Result<Announcement, AppError> {
    viewer.require_permission(Permission::ManageAnnouncements)?;
    let (title, content) = draft.checked()?;

    expect_affected(
        db::update_announcement(pool, id, title, content).await?,
        "announcement",
        id,
    )?;

    db::get_announcement(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("announcement {}", id)))
}

#[instrument(skip(pool, viewer))]
pub async fn delete(pool: &Pool<Sqlite>, viewer: &Viewer, id: i64) -> Result<(), AppError> {
    viewer.require_permission(Permission::ManageAnnouncements)?;

    expect_affected(db::delete_announcement(pool, id).await?, "announcement", id)?;
    info!(id, "Deleted announcement");
    Ok(())
}
