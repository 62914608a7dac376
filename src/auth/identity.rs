use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distr::Alphanumeric};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::session::SessionRegistry;

use super::{Identity, fallback_username};

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

const TOKEN_LENGTH: usize = 48;

#[derive(Debug, Clone, Serialize)]
pub struct UserSession {
    pub id: i64,
    pub identity_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserSession {
    pub id: Option<i64>,
    pub identity_id: Option<String>,
    pub token: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<DbUserSession> for UserSession {
    fn from(session: DbUserSession) -> Self {
        Self {
            id: session.id.unwrap_or_default(),
            identity_id: session.identity_id.unwrap_or_default(),
            token: session.token.unwrap_or_default(),
            created_at: session.created_at.unwrap_or_else(Utc::now),
            // A row without an expiry is never valid.
            expires_at: session.expires_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

impl UserSession {
    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

#[instrument(skip(pool, password))]
pub async fn sign_up(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
    username: Option<&str>,
) -> Result<Identity, AppError> {
    let email = email.trim().to_lowercase();

    if db::find_credentials(pool, &email).await?.is_some() {
        return Err(AppError::Validation(format!(
            "Email '{}' is already registered",
            email
        )));
    }

    let hashed_password = bcrypt::hash(password, HASH_COST)?;
    let id = Uuid::new_v4().to_string();
    let display_name = username.map(str::trim).filter(|name| !name.is_empty());
    let username = match display_name {
        Some(name) => name.to_string(),
        None => fallback_username(&Identity {
            id: id.clone(),
            email: email.clone(),
            display_name: None,
        }),
    };

    let identity = db::create_identity(
        pool,
        &id,
        &email,
        &hashed_password,
        display_name,
        &username,
    )
    .await?;
    info!(identity_id = %identity.id, "Registered new identity");

    Ok(identity)
}

/// `Ok(None)` for unknown email or wrong password.
#[instrument(skip(pool, password))]
pub async fn sign_in(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
    session_hours: i64,
) -> Result<Option<(Identity, UserSession)>, AppError> {
    let email = email.trim().to_lowercase();

    let Some((identity, hashed_password)) = db::find_credentials(pool, &email).await? else {
        return Ok(None);
    };

    match bcrypt::verify(password, &hashed_password) {
        Ok(true) => {}
        Ok(false) => return Ok(None),
        Err(err) => {
            warn!(identity_id = %identity.id, error = %err, "Stored password hash is unreadable");
            return Ok(None);
        }
    }

    let token = UserSession::generate_token();
    let expires_at = Utc::now() + Duration::hours(session_hours);
    let session = db::create_user_session(pool, &identity.id, &token, expires_at).await?;

    info!(identity_id = %identity.id, "Signed in");
    Ok(Some((identity, session)))
}

pub async fn sign_out(
    pool: &Pool<Sqlite>,
    registry: &SessionRegistry,
    token: &str,
) -> Result<(), AppError> {
    registry.sign_out(token);
    db::invalidate_session(pool, token).await
}

/// Identity behind a session token, `None` when the token is unknown or expired.
pub async fn current_identity(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<Option<Identity>, AppError> {
    let Some(session) = db::get_session_by_token(pool, token).await? else {
        return Ok(None);
    };

    if !session.is_valid() {
        warn!(session_id = session.id, "Session token expired");
        return Ok(None);
    }

    db::get_identity(pool, &session.identity_id).await
}

/// Deletes expired sessions and drops their stores from the registry.
pub async fn sweep_expired_sessions(
    pool: &Pool<Sqlite>,
    registry: &SessionRegistry,
) -> Result<usize, AppError> {
    let tokens = db::take_expired_sessions(pool, Utc::now()).await?;
    let dropped = registry.forget(&tokens);

    if !tokens.is_empty() {
        info!(expired = tokens.len(), live_stores_dropped = dropped, "Swept expired sessions");
    }
    Ok(tokens.len())
}
