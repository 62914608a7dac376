use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::serde::json::Json;
use rocket::{get, post, put};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::{
    Capabilities, Identity, Role, SESSION_COOKIE, Session, UserSession, Viewer, sign_in,
    sign_out, sign_up,
};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::mediator::profiles;
use crate::session::SessionRegistry;
use crate::validation::JsonValidateExt;

use super::{Ack, ApiResult};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(max = 50, message = "Username is limited to 50 characters"))]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileRequest {
    #[validate(length(min = 1, max = 50, message = "Username must be 1 to 50 characters"))]
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: Option<Role>,
    pub capabilities: Capabilities,
}

impl MeResponse {
    fn for_viewer(identity: &Identity, viewer: &Viewer) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            username: viewer.display_username(),
            role: viewer.role(),
            capabilities: viewer.capabilities(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<MeResponse>,
    pub error: Option<String>,
}

async fn start_session(
    db: &Pool<Sqlite>,
    registry: &SessionRegistry,
    config: &AppConfig,
    cookies: &CookieJar<'_>,
    identity: Identity,
    session: UserSession,
) -> MeResponse {
    let store = registry.store_for(&session.token);
    let viewer = store.resolve(db, Some(identity.clone())).await;

    cookies.add_private(
        Cookie::build((SESSION_COOKIE, session.token))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::hours(config.session_hours)),
    );

    MeResponse::for_viewer(&identity, &viewer)
}

#[post("/auth/register", data = "<request>")]
pub async fn register(
    request: Json<RegisterRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    registry: &State<SessionRegistry>,
    config: &State<AppConfig>,
) -> ApiResult<LoginResponse> {
    let request = request.validate_custom()?;

    sign_up(db, &request.email, &request.password, request.username.as_deref()).await?;

    let (identity, session) = sign_in(db, &request.email, &request.password, config.session_hours)
        .await?
        .ok_or_else(|| AppError::Internal("New identity could not sign in".to_string()))?;

    let user = start_session(db, registry, config, cookies, identity, session).await;
    Ok(Json(LoginResponse {
        success: true,
        user: Some(user),
        error: None,
    }))
}

#[post("/auth/login", data = "<request>")]
pub async fn login(
    request: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    registry: &State<SessionRegistry>,
    config: &State<AppConfig>,
) -> ApiResult<LoginResponse> {
    let request = request.validate_custom()?;

    match sign_in(db, &request.email, &request.password, config.session_hours).await? {
        Some((identity, session)) => {
            let user = start_session(db, registry, config, cookies, identity, session).await;
            Ok(Json(LoginResponse {
                success: true,
                user: Some(user),
                error: None,
            }))
        }
        None => {
            info!("Rejected login attempt");
            Ok(Json(LoginResponse {
                success: false,
                user: None,
                error: Some("Invalid email or password".to_string()),
            }))
        }
    }
}

#[post("/auth/logout")]
pub async fn logout(
    session: &Session,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    registry: &State<SessionRegistry>,
) -> ApiResult<Ack> {
    if let Some(token) = &session.token {
        sign_out(db, registry, token).await?;
    }
    cookies.remove_private(Cookie::build(SESSION_COOKIE));

    Ok(Ack::ok())
}

#[get("/me")]
pub async fn me(viewer: Viewer) -> ApiResult<MeResponse> {
    let identity = viewer.require_identity()?;
    Ok(Json(MeResponse::for_viewer(identity, &viewer)))
}

#[put("/profile", data = "<request>")]
pub async fn update_profile(
    request: Json<ProfileRequest>,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    registry: &State<SessionRegistry>,
) -> ApiResult<Ack> {
    let request = request.validate_custom()?;
    profiles::update_username(db, registry, &viewer, &request.username).await?;

    Ok(Ack::ok())
}
