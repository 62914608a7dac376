use chrono::{DateTime, Utc};
use rocket::futures::future::join_all;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::auth::{Permission, Viewer, can_delete_resource, can_edit_resource};
use crate::db;
use crate::error::AppError;
use crate::models::{Collection, ContentItem, ContentKind, Subtest};
use crate::storage::{BlobStore, DOCUMENTS_BUCKET, object_path};

use super::{ReadPolicy, expect_affected, rows_or_empty};

#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ContentDraft {
    pub title: String,
    pub description: String,
    pub file: Option<FileUpload>,
}

impl ContentDraft {
    fn title(&self) -> Result<&str, AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            Err(AppError::Validation("Title cannot be empty".to_string()))
        } else {
            Ok(title)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionCount {
    pub collection: String,
    pub kind: ContentKind,
    pub subtest: Subtest,
    pub title: &'static str,
    pub count: i64,
}

fn with_url(blobs: &dyn BlobStore, mut item: ContentItem) -> ContentItem {
    item.file_url = item
        .file_path
        .as_deref()
        .map(|path| blobs.public_url(DOCUMENTS_BUCKET, path));
    item
}

async fn remove_best_effort(blobs: &dyn BlobStore, path: &str) {
    if let Err(err) = blobs.remove(DOCUMENTS_BUCKET, &[path.to_string()]).await {
        warn!(path = %path, error = %err, "Could not remove stored file, leaving it orphaned");
    }
}

async fn fetch_existing(pool: &Pool<Sqlite>, id: i64) -> Result<ContentItem, AppError> {
    db::get_content(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("content item {}", id)))
}

#[instrument(skip(pool, blobs, viewer))]
pub async fn list(
    pool: &Pool<Sqlite>,
    blobs: &dyn BlobStore,
    viewer: &Viewer,
    policy: ReadPolicy,
    collection: Collection,
) -> Result<Vec<ContentItem>, AppError> {
    let scope = policy.scope(viewer)?;
    let items = rows_or_empty(
        db::list_content(pool, &collection.name(), scope.owner()).await,
        "content",
    );

    Ok(items.into_iter().map(|item| with_url(blobs, item)).collect())
}

#[instrument(skip(pool, blobs, viewer))]
pub async fn get(
    pool: &Pool<Sqlite>,
    blobs: &dyn BlobStore,
    viewer: &Viewer,
    policy: ReadPolicy,
    id: i64,
) -> Result<ContentItem, AppError> {
    let scope = policy.scope(viewer)?;
    let item = fetch_existing(pool, id).await?;

    if scope.owner().is_some_and(|owner| owner != item.user_id) {
        return Err(AppError::NotFound(format!("content item {}", id)));
    }

    Ok(with_url(blobs, item))
}

#[instrument(skip(pool, blobs, viewer, draft), fields(title = %draft.title))]
pub async fn create(
    pool: &Pool<Sqlite>,
    blobs: &dyn BlobStore,
    viewer: &Viewer,
    collection: Collection,
    draft: ContentDraft,
    now: DateTime<Utc>,
) -> Result<ContentItem, AppError> {
    let identity = viewer.require_permission(Permission::UploadContent)?;
    let title = draft.title()?.to_string();
    let collection_name = collection.name();

    let file_path = match draft.file {
        Some(file) => {
            let path = object_path(&collection_name, &file.name, now);
            Some(blobs.upload(DOCUMENTS_BUCKET, &path, file.bytes).await?)
        }
        None => None,
    };

    let inserted = db::insert_content(
        pool,
        &collection_name,
        &title,
        draft.description.trim(),
        file_path.as_deref(),
        &identity.id,
        now,
    )
    .await;

    let id = match inserted {
        Ok(id) => id,
        Err(err) => {
            if let Some(path) = &file_path {
                remove_best_effort(blobs, path).await;
            }
            return Err(err);
        }
    };

    info!(id, collection = %collection_name, "Created content item");
    Ok(with_url(blobs, fetch_existing(pool, id).await?))
}

/// A new file is uploaded before the row changes; the old file goes last.
#[instrument(skip(pool, blobs, viewer, draft))]
pub async fn update(
    pool: &Pool<Sqlite>,
    blobs: &dyn BlobStore,
    viewer: &Viewer,
    id: i64,
    draft: ContentDraft,
    now: DateTime<Utc>,
) -> Result<ContentItem, AppError> {
    let identity = viewer.require_identity()?;
    let existing = fetch_existing(pool, id).await?;

    if !can_edit_resource(&existing, identity) {
        warn!(identity_id = %identity.id, id, "Refusing to edit content owned by someone else");
        return Err(AppError::Authorization(format!(
            "content item {} belongs to another user",
            id
        )));
    }
    let title = draft.title()?.to_string();

    let new_path = match draft.file {
        Some(file) => {
            let path = object_path(&existing.collection, &file.name, now);
            Some(blobs.upload(DOCUMENTS_BUCKET, &path, file.bytes).await?)
        }
        None => None,
    };
    let file_path = new_path.as_deref().or(existing.file_path.as_deref());

    let updated = db::update_content(
        pool,
        id,
        &title,
        draft.description.trim(),
        file_path,
    )
    .await
    .and_then(|rows| expect_affected(rows, "content item", id));

    if let Err(err) = updated {
        if let Some(path) = &new_path {
            remove_best_effort(blobs, path).await;
        }
        return Err(err);
    }

    if let (Some(_), Some(old_path)) = (&new_path, &existing.file_path) {
        remove_best_effort(blobs, old_path).await;
    }

    info!(id, "Updated content item");
    Ok(with_url(blobs, fetch_existing(pool, id).await?))
}

/// The row goes first; a file that cannot be removed is only logged.
#[instrument(skip(pool, blobs, viewer))]
pub async fn delete(
    pool: &Pool<Sqlite>,
    blobs: &dyn BlobStore,
    viewer: &Viewer,
    id: i64,
) -> Result<(), AppError> {
    let identity = viewer.require_identity()?;
    let existing = fetch_existing(pool, id).await?;

    if !can_delete_resource(&existing, identity, viewer.role()) {
        warn!(identity_id = %identity.id, id, "Refusing to delete content owned by someone else");
        return Err(AppError::Authorization(format!(
            "content item {} belongs to another user",
            id
        )));
    }

    expect_affected(db::delete_content(pool, id).await?, "content item", id)?;

    if let Some(path) = &existing.file_path {
        remove_best_effort(blobs, path).await;
    }

    info!(id, "Deleted content item");
    Ok(())
}

async fn count_or_zero(pool: &Pool<Sqlite>, collection: Collection) -> CollectionCount {
    let name = collection.name();
    let count = match db::count_content(pool, &name).await {
        Ok(count) => count,
        Err(err) => {
            warn!(collection = %name, error = %err, "Count failed, showing zero");
            0
        }
    };

    CollectionCount {
        collection: name,
        kind: collection.kind,
        subtest: collection.subtest,
        title: collection.subtest.title(),
        count,
    }
}

/// One concurrent count per subtest; each falls back to zero on its own.
#[instrument(skip(pool))]
pub async fn counts(pool: &Pool<Sqlite>, kind: ContentKind) -> Vec<CollectionCount> {
    join_all(
        Subtest::ALL
            .into_iter()
            .map(|subtest| count_or_zero(pool, Collection::new(kind, subtest))),
    )
    .await
}

#[instrument(skip(pool))]
pub async fn all_counts(pool: &Pool<Sqlite>) -> Vec<CollectionCount> {
    join_all(Collection::all().map(|collection| count_or_zero(pool, collection))).await
}
