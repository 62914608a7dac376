use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::auth::{Permission, Role, Viewer};
use crate::db;
use crate::error::AppError;
use crate::models::UserAccount;
use crate::session::SessionRegistry;

use super::{ReadPolicy, expect_affected};

#[instrument(skip(pool, viewer))]
pub async fn list(
    pool: &Pool<Sqlite>,
    viewer: &Viewer,
    policy: ReadPolicy,
) -> Result<Vec<UserAccount>, AppError> {
    let scope = policy.scope(viewer)?;
    let accounts = db::list_user_accounts(pool).await?;

    Ok(match scope.owner() {
        Some(owner) => accounts
            .into_iter()
            .filter(|account| account.id == owner)
            .collect(),
        None => accounts,
    })
}

/// Live sessions of the target identity pick up the new role immediately.
#[instrument(skip(pool, registry, viewer))]
pub async fn update_role(
    pool: &Pool<Sqlite>,
    registry: &SessionRegistry,
    viewer: &Viewer,
    target_id: &str,
    role: Role,
) -> Result<usize, AppError> {
    let admin = viewer.require_permission(Permission::ManageUsers)?;

    if admin.id == target_id && role != Role::Admin {
        warn!(identity_id = %admin.id, "Admin is removing their own admin role");
    }

    let rows = db::update_profile_role(pool, target_id, role).await?;
    expect_affected(rows, "profile", target_id)?;

    info!(target_id, role = %role, "Updated role");
    Ok(registry.refresh_identity(pool, target_id).await)
}

#[instrument(skip(pool, registry, viewer))]
pub async fn update_username(
    pool: &Pool<Sqlite>,
    registry: &SessionRegistry,
    viewer: &Viewer,
    username: &str,
) -> Result<(), AppError> {
    let identity = viewer.require_permission(Permission::EditOwnProfile)?;
    let username = username.trim();

    if username.is_empty() {
        return Err(AppError::Validation("Username cannot be empty".to_string()));
    }

    let rows = db::update_profile_username(pool, &identity.id, username).await?;
    expect_affected(rows, "profile", &identity.id)?;

    registry.refresh_identity(pool, &identity.id).await;
    Ok(())
}
