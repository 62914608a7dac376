use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{State, get, put};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};

use crate::auth::{Administrator, Gated, Role};
use crate::config::AppConfig;
use crate::mediator::ResourceType;
use crate::mediator::{notes, profiles};
use crate::models::{Note, UserAccount};
use crate::session::SessionRegistry;

use super::ApiResult;

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleResponse {
    pub success: bool,
    /// Live sessions of the target that picked up the new role.
    pub refreshed_sessions: usize,
}

#[get("/admin/users")]
pub async fn list_users(
    admin: Gated<Administrator>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> ApiResult<Vec<UserAccount>> {
    let policy = config.policy(ResourceType::Profiles);
    Ok(Json(profiles::list(db, &admin.viewer, policy).await?))
}

#[get("/admin/notes")]
pub async fn list_notes(
    admin: Gated<Administrator>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Note>> {
    Ok(Json(notes::list_for_moderation(db, &admin.viewer, Utc::now()).await?))
}

#[put("/admin/users/<id>/role", data = "<request>")]
pub async fn update_role(
    id: &str,
    request: Json<RoleRequest>,
    admin: Gated<Administrator>,
    db: &State<Pool<Sqlite>>,
    registry: &State<SessionRegistry>,
) -> ApiResult<RoleResponse> {
    let refreshed_sessions =
        profiles::update_role(db, registry, &admin.viewer, id, request.role).await?;

    Ok(Json(RoleResponse {
        success: true,
        refreshed_sessions,
    }))
}
