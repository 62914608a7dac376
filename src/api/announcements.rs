use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post, put};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::Viewer;
use crate::config::AppConfig;
use crate::mediator::ResourceType;
use crate::mediator::announcements::{self, AnnouncementDraft};
use crate::models::Announcement;
use crate::validation::JsonValidateExt;

use super::{Ack, ApiResult};

#[derive(Debug, Deserialize, Validate)]
pub struct AnnouncementRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
}

impl From<AnnouncementRequest> for AnnouncementDraft {
    fn from(request: AnnouncementRequest) -> Self {
        AnnouncementDraft {
            title: request.title,
            content: request.content,
        }
    }
}

#[get("/announcements")]
pub async fn list(
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> ApiResult<Vec<Announcement>> {
    let policy = config.policy(ResourceType::Announcements);
    Ok(Json(announcements::list(db, &viewer, policy).await?))
}

#[post("/announcements", data = "<request>")]
pub async fn create(
    request: Json<AnnouncementRequest>,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Announcement> {
    let request = request.validate_custom()?;
    let announcement = announcements::create(db, &viewer, request.into(), Utc::now()).await?;

    Ok(Json(announcement))
}

#[put("/announcements/<id>", data = "<request>")]
pub async fn update(
    id: i64,
    request: Json<AnnouncementRequest>,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Announcement> {
    let request = request.validate_custom()?;
    let announcement = announcements::update(db, &viewer, id, request.into()).await?;

    Ok(Json(announcement))
}

#[delete("/announcements/<id>")]
pub async fn delete(id: i64, viewer: Viewer, db: &State<Pool<Sqlite>>) -> ApiResult<Ack> {
    announcements::delete(db, &viewer, id).await?;
    Ok(Ack::ok())
}
