pub mod admin;
pub mod announcements;
pub mod auth;
pub mod content;
pub mod feedback;
pub mod gate;
pub mod notes;
pub mod todos;

use rocket::serde::json::Json;
use rocket::{Route, get, routes};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AppError;
use crate::storage::BlobStore;

pub type ApiResult<T> = Result<Json<T>, AppError>;

/// Blob store as held in managed state.
pub type Blobs = Arc<dyn BlobStore>;

#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[get("/health")]
pub fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn routes() -> Vec<Route> {
    routes![
        health,
        auth::register,
        auth::login,
        auth::logout,
        auth::me,
        auth::update_profile,
        gate::probe,
        gate::watch,
        content::kind_counts,
        content::all_counts,
        content::list,
        content::get_item,
        content::create,
        content::update,
        content::delete,
        notes::list,
        notes::create,
        notes::update,
        notes::delete,
        notes::feed,
        todos::list,
        todos::create,
        todos::update,
        todos::toggle,
        todos::delete,
        announcements::list,
        announcements::create,
        announcements::update,
        announcements::delete,
        feedback::list,
        feedback::create,
        feedback::delete,
        admin::list_users,
        admin::list_notes,
        admin::update_role,
    ]
}
