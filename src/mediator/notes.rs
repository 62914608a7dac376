use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::auth::{Permission, Viewer, can_delete_resource, can_edit_resource};
use crate::db;
use crate::error::AppError;
use crate::lifecycle::{is_live, note_ttl, retain_live};
use crate::models::Note;

use super::{ReadPolicy, expect_affected, rows_or_empty};

/// The feed shows at most this many notes, newest first.
pub const NOTES_LIMIT: i64 = 10;
pub const NOTE_MAX_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteEvent {
    Created(Note),
    Updated(Note),
    Deleted { id: i64 },
}

/// Fan-out of note mutations to live feeds.
pub struct NoteFeed {
    tx: broadcast::Sender<NoteEvent>,
}

impl NoteFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NoteEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: NoteEvent) {
        if self.tx.send(event).is_err() {
            debug!("No live note feeds to notify");
        }
    }
}

impl Default for NoteFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

fn checked_content(content: &str) -> Result<&str, AppError> {
    let content = content.trim();
    let length = content.chars().count();

    if length == 0 {
        return Err(AppError::Validation("Note cannot be empty".to_string()));
    }
    if length > NOTE_MAX_CHARS {
        return Err(AppError::Validation(format!(
            "Note is limited to {} characters",
            NOTE_MAX_CHARS
        )));
    }
    Ok(content)
}

/// Expired notes are indistinguishable from missing ones.
async fn fetch_live(pool: &Pool<Sqlite>, id: i64, now: DateTime<Utc>) -> Result<Note, AppError> {
    db::get_note(pool, id)
        .await?
        .filter(|note| is_live(note.created_at, note_ttl(), now))
        .ok_or_else(|| AppError::NotFound(format!("note {}", id)))
}

#[instrument(skip(pool, viewer))]
pub async fn list(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    policy: ReadPolicy,
    now: DateTime<Utc>,
) -> Result<Vec<Note>, AppError> {
    let scope = policy.scope(viewer)?;
    let notes = rows_or_empty(
        db::list_notes(pool, scope.owner(), Some(NOTES_LIMIT)).await,
        "notes",
    );

    Ok(retain_live(notes, note_ttl(), now))
}

/// Every live note, uncapped, for moderation.
#[instrument(skip(pool, viewer))]
pub async fn list_for_moderation(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    now: DateTime<Utc>,
) -> Result<Vec<Note>, AppError> {
    viewer.require_permission(Permission::ManageContent)?;
    let notes = rows_or_empty(db::list_notes(pool, None, None).await, "notes");

    Ok(retain_live(notes, note_ttl(), now))
}

#[instrument(skip(pool, feed, viewer, content))]
pub async fn create(
    pool: &Pool<Sqlite>,
    feed: &NoteFeed,
    viewer: &Viewer,
    content: &str,
    now: DateTime<Utc>,
) -> Result<Note, AppError> {
    let identity = viewer.require_permission(Permission::AddNotes)?;
    let content = checked_content(content)?;

    let id = db::insert_note(pool, &identity.id, content, now).await?;
    let note = Note {
        id,
        user_id: identity.id.clone(),
        content: content.to_string(),
        username: viewer.display_username(),
        created_at: now,
    };

    info!(id, "Created note");
    feed.publish(NoteEvent::Created(note.clone()));
    Ok(note)
}

#[instrument(skip(pool, feed, viewer, content))]
pub async fn update(
    pool: &Pool<Sqlite>,
    feed: &NoteFeed,
    viewer: &Viewer,
    id: i64,
    content: &str,
    now: DateTime<Utc>,
) -> Result<Note, AppError> {
    let identity = viewer.require_identity()?;
    let existing = fetch_live(pool, id, now).await?;

    if !can_edit_resource(&existing, identity) {
        warn!(identity_id = %identity.id, id, "Refusing to edit another user's note");
        return Err(AppError::Authorization(format!("note {} belongs to another user", id)));
    }

    let content = checked_content(content)?;
    expect_affected(db::update_note(pool, id, content).await?, "note", id)?;

    let note = Note {
        content: content.to_string(),
        ..existing
    };
    feed.publish(NoteEvent::Updated(note.clone()));
    Ok(note)
}

#[instrument(skip(pool, feed, viewer))]
pub async fn delete(
    pool: &Pool<Sqlite>,
    feed: &NoteFeed,
    viewer: &Viewer,
    id: i64,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let identity = viewer.require_identity()?;
    let existing = fetch_live(pool, id, now).await?;

    if !can_delete_resource(&existing, identity, viewer.role()) {
        warn!(identity_id = %identity.id, id, "Refusing to delete another user's note");
        return Err(AppError::Authorization(format!("note {} belongs to another user", id)));
    }

    expect_affected(db::delete_note(pool, id).await?, "note", id)?;

    info!(id, "Deleted note");
    feed.publish(NoteEvent::Deleted { id });
    Ok(())
}

/// Physically removes expired rows. Readers never depend on this having run.
#[instrument(skip(pool))]
pub async fn purge_expired(pool: &Pool<Sqlite>, now: DateTime<Utc>) -> Result<u64, AppError> {
    let expired: Vec<i64> = db::list_note_stamps(pool)
        .await?
        .into_iter()
        .filter(|(_, created_at)| {
            created_at.is_none_or(|created_at| !is_live(created_at, note_ttl(), now))
        })
        .map(|(id, _)| id)
        .collect();

    if expired.is_empty() {
        return Ok(0);
    }

    db::delete_notes(pool, &expired).await
}
