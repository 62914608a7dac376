use chrono::{DateTime, Utc};
use rocket::serde::json::Json;
use rocket::{State, delete, get, post, put};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Gated, Member, Viewer};
use crate::config::AppConfig;
use crate::mediator::ResourceType;
use crate::mediator::todos::{self, TodoDraft};
use crate::models::{Priority, Todo};
use crate::validation::JsonValidateExt;

use super::{Ack, ApiResult};

#[derive(Debug, Deserialize, Validate)]
pub struct TodoRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl From<TodoRequest> for TodoDraft {
    fn from(request: TodoRequest) -> Self {
        TodoDraft {
            title: request.title,
            description: request.description,
            deadline: request.deadline,
            priority: request.priority.unwrap_or_default(),
        }
    }
}

#[get("/todos")]
pub async fn list(
    member: Gated<Member>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> ApiResult<Vec<Todo>> {
    let todos = todos::list(db, &member.viewer, config.policy(ResourceType::Todos)).await?;
    Ok(Json(todos))
}

#[post("/todos", data = "<request>")]
pub async fn create(
    request: Json<TodoRequest>,
    member: Gated<Member>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Todo> {
    let request = request.validate_custom()?;
    let todo = todos::create(db, &member.viewer, request.into()).await?;

    Ok(Json(todo))
}

#[put("/todos/<id>", data = "<request>")]
pub async fn update(
    id: i64,
    request: Json<TodoRequest>,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Todo> {
    let request = request.validate_custom()?;
    let todo = todos::update(db, &viewer, id, request.into()).await?;

    Ok(Json(todo))
}

#[post("/todos/<id>/toggle")]
pub async fn toggle(id: i64, viewer: Viewer, db: &State<Pool<Sqlite>>) -> ApiResult<Todo> {
    Ok(Json(todos::toggle(db, &viewer, id).await?))
}

#[delete("/todos/<id>")]
pub async fn delete(id: i64, viewer: Viewer, db: &State<Pool<Sqlite>>) -> ApiResult<Ack> {
    todos::delete(db, &viewer, id).await?;
    Ok(Ack::ok())
}
