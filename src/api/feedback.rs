use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::Viewer;
use crate::config::AppConfig;
use crate::mediator::ResourceType;
use crate::mediator::feedback;
use crate::models::Feedback;
use crate::validation::JsonValidateExt;

use super::{Ack, ApiResult};

#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[validate(length(min = 1, max = 2000, message = "Feedback must be 1 to 2000 characters"))]
    pub message: String,
}

#[get("/feedback")]
pub async fn list(
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> ApiResult<Vec<Feedback>> {
    let policy = config.policy(ResourceType::Feedback);
    Ok(Json(feedback::list(db, &viewer, policy).await?))
}

#[post("/feedback", data = "<request>")]
pub async fn create(
    request: Json<FeedbackRequest>,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Feedback> {
    let request = request.validate_custom()?;
    let entry = feedback::create(db, &viewer, &request.message, Utc::now()).await?;

    Ok(Json(entry))
}

#[delete("/feedback/<id>")]
pub async fn delete(id: i64, viewer: Viewer, db: &State<Pool<Sqlite>>) -> ApiResult<Ack> {
    feedback::delete(db, &viewer, id).await?;
    Ok(Ack::ok())
}
