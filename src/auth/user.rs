use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::warn;

use crate::db;
use crate::error::AppError;

use super::{AccessDecision, Capabilities, Permission, Role, decide_access};

/// An authenticated principal. Owned by the identity service; read-only elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbIdentity {
    pub id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl From<DbIdentity> for Identity {
    fn from(identity: DbIdentity) -> Self {
        Self {
            id: identity.id.unwrap_or_default(),
            email: identity.email.unwrap_or_default(),
            display_name: identity.display_name.filter(|name| !name.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbProfile {
    pub id: Option<String>,
    pub username: Option<String>,
    pub role: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<DbProfile> for Profile {
    fn from(profile: DbProfile) -> Self {
        let role = profile
            .role
            .as_deref()
            .map(Role::from_str)
            .and_then(Result::ok)
            .unwrap_or(Role::User);

        Self {
            id: profile.id.unwrap_or_default(),
            username: profile.username.unwrap_or_default(),
            role,
            created_at: profile.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Role and display name derived for the current identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ResolvedProfile {
    pub role: Option<Role>,
    pub username: Option<String>,
}

impl ResolvedProfile {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Degraded profile used when the profile row cannot be read.
    pub fn fallback(identity: &Identity) -> Self {
        Self {
            role: Some(Role::User),
            username: Some(fallback_username(identity)),
        }
    }
}

pub fn fallback_username(identity: &Identity) -> String {
    if let Some(name) = &identity.display_name {
        return name.clone();
    }

    identity
        .email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or("Pengguna")
        .to_string()
}

pub async fn resolve_profile(pool: &Pool<Sqlite>, identity: Option<&Identity>) -> ResolvedProfile {
    let Some(identity) = identity else {
        return ResolvedProfile::anonymous();
    };

    match db::get_profile(pool, &identity.id).await {
        Ok(Some(profile)) => {
            let username = if profile.username.trim().is_empty() {
                fallback_username(identity)
            } else {
                profile.username
            };

            ResolvedProfile {
                role: Some(profile.role),
                username: Some(username),
            }
        }
        Ok(None) => {
            warn!(identity_id = %identity.id, "Profile row missing, defaulting to user role");
            ResolvedProfile::fallback(identity)
        }
        Err(err) => {
            warn!(identity_id = %identity.id, error = %err, "Profile lookup failed, defaulting to user role");
            ResolvedProfile::fallback(identity)
        }
    }
}

/// Identity plus resolved profile as seen by one request or one live view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Viewer {
    pub identity: Option<Identity>,
    pub profile: ResolvedProfile,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(identity: Option<Identity>, profile: ResolvedProfile) -> Self {
        Self { identity, profile }
    }

    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().and(self.profile.role)
    }

    pub fn identity_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.id.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_role(self.role())
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role().is_some_and(|role| role.has_permission(permission))
    }

    pub fn require_identity(&self) -> Result<&Identity, AppError> {
        self.identity
            .as_ref()
            .ok_or_else(|| AppError::Authentication("Login required".to_string()))
    }

    pub fn require_permission(&self, permission: Permission) -> Result<&Identity, AppError> {
        let identity = self.require_identity()?;

        match decide_access(Some(identity), self.role(), permission) {
            AccessDecision::Granted => Ok(identity),
            decision => {
                warn!(
                    identity_id = %identity.id,
                    role = ?self.role(),
                    permission = ?permission,
                    "Permission denied"
                );
                let message = format!("missing permission {:?}", permission);
                if decision == AccessDecision::UpgradeRequired {
                    Err(AppError::UpgradeRequired(message))
                } else {
                    Err(AppError::Authorization(message))
                }
            }
        }
    }

    /// Display name used for snapshots (feedback, notes feed).
    pub fn display_username(&self) -> String {
        match (&self.profile.username, &self.identity) {
            (Some(username), _) => username.clone(),
            (None, Some(identity)) => fallback_username(identity),
            (None, None) => "Pengguna".to_string(),
        }
    }
}
