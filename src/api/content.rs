use chrono::Utc;
use rocket::State;
use rocket::form::{Form, FromForm};
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::tokio::io::AsyncReadExt;
use rocket::{delete, get, post, put};
use sqlx::{Pool, Sqlite};

use crate::auth::Viewer;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::mediator::content::{self, CollectionCount, ContentDraft, FileUpload};
use crate::mediator::ResourceType;
use crate::models::{Collection, ContentItem, ContentKind, Subtest};

use super::{Ack, ApiResult, Blobs};

#[derive(FromForm)]
pub struct ContentForm<'r> {
    pub title: String,
    pub description: Option<String>,
    pub file: Option<TempFile<'r>>,
}

async fn read_upload(file: Option<&TempFile<'_>>) -> Result<Option<FileUpload>, AppError> {
    let Some(file) = file.filter(|file| file.len() > 0) else {
        return Ok(None);
    };

    let name = file
        .raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .or_else(|| file.name().map(String::from))
        .unwrap_or_else(|| "file".to_string());

    let mut bytes = Vec::new();
    let mut reader = Box::pin(file.open().await?);
    reader.read_to_end(&mut bytes).await?;

    Ok(Some(FileUpload { name, bytes }))
}

async fn into_draft(form: Form<ContentForm<'_>>) -> Result<ContentDraft, AppError> {
    let file = read_upload(form.file.as_ref()).await?;
    let form = form.into_inner();

    Ok(ContentDraft {
        title: form.title,
        description: form.description.unwrap_or_default(),
        file,
    })
}

#[get("/content/<kind>/counts")]
pub async fn kind_counts(kind: ContentKind, db: &State<Pool<Sqlite>>) -> Json<Vec<CollectionCount>> {
    Json(content::counts(db, kind).await)
}

#[get("/content/counts")]
pub async fn all_counts(db: &State<Pool<Sqlite>>) -> Json<Vec<CollectionCount>> {
    Json(content::all_counts(db).await)
}

#[get("/content/<kind>/<subtest>", rank = 2)]
pub async fn list(
    kind: ContentKind,
    subtest: Subtest,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    blobs: &State<Blobs>,
    config: &State<AppConfig>,
) -> ApiResult<Vec<ContentItem>> {
    let items = content::list(
        db,
        blobs.inner().as_ref(),
        &viewer,
        config.policy(ResourceType::Content),
        Collection::new(kind, subtest),
    )
    .await?;

    Ok(Json(items))
}

#[get("/content/<id>")]
pub async fn get_item(
    id: i64,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    blobs: &State<Blobs>,
    config: &State<AppConfig>,
) -> ApiResult<ContentItem> {
    let item = content::get(
        db,
        blobs.inner().as_ref(),
        &viewer,
        config.policy(ResourceType::Content),
        id,
    )
    .await?;

    Ok(Json(item))
}

#[post("/content/<kind>/<subtest>", data = "<form>")]
pub async fn create(
    kind: ContentKind,
    subtest: Subtest,
    form: Form<ContentForm<'_>>,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    blobs: &State<Blobs>,
) -> ApiResult<ContentItem> {
    let draft = into_draft(form).await?;
    let item = content::create(
        db,
        blobs.inner().as_ref(),
        &viewer,
        Collection::new(kind, subtest),
        draft,
        Utc::now(),
    )
    .await?;

    Ok(Json(item))
}

#[put("/content/<id>", data = "<form>")]
pub async fn update(
    id: i64,
    form: Form<ContentForm<'_>>,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    blobs: &State<Blobs>,
) -> ApiResult<ContentItem> {
    let draft = into_draft(form).await?;
    let item = content::update(db, blobs.inner().as_ref(), &viewer, id, draft, Utc::now()).await?;

    Ok(Json(item))
}

#[delete("/content/<id>")]
pub async fn delete(
    id: i64,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    blobs: &State<Blobs>,
) -> ApiResult<Ack> {
    content::delete(db, blobs.inner().as_ref(), &viewer, id).await?;
    Ok(Ack::ok())
}
