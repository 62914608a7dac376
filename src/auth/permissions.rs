use anyhow::Error;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewOwnProfile,
    EditOwnProfile,
    ManageOwnTodos,
    SendFeedback,

    ViewPremiumContent,
    AddNotes,
    UploadContent,

    ManageContent,
    ManageAnnouncements,
    ManageUsers,
    ReviewFeedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Subs,
    Admin,
}

static USER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::EditOwnProfile);
    permissions.insert(Permission::ManageOwnTodos);
    permissions.insert(Permission::SendFeedback);

    permissions
});

static SUBS_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(USER_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewPremiumContent);
    permissions.insert(Permission::AddNotes);
    permissions.insert(Permission::UploadContent);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(SUBS_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageContent);
    permissions.insert(Permission::ManageAnnouncements);
    permissions.insert(Permission::ManageUsers);
    permissions.insert(Permission::ReviewFeedback);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::User => &USER_PERMISSIONS,
            Role::Subs => &SUBS_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Subs => "subs",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "user" => Ok(Role::User),
            "subs" => Ok(Role::Subs),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn role_has(role: Option<Role>, permission: Permission) -> bool {
    role.is_some_and(|r| r.has_permission(permission))
}

// Capability flags derived from a resolved role; `None` means no identity.

pub fn can_add_notes(role: Option<Role>) -> bool {
    role_has(role, Permission::AddNotes)
}

pub fn can_manage_content(role: Option<Role>) -> bool {
    role_has(role, Permission::ManageContent)
}

pub fn has_premium_access(role: Option<Role>) -> bool {
    role_has(role, Permission::ViewPremiumContent)
}

pub fn requires_upgrade(role: Option<Role>) -> bool {
    role == Some(Role::User)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_add_notes: bool,
    pub can_manage_content: bool,
    pub has_premium_access: bool,
    pub requires_upgrade: bool,
    pub requires_login: bool,
}

impl Capabilities {
    pub fn for_role(role: Option<Role>) -> Self {
        Self {
            can_add_notes: can_add_notes(role),
            can_manage_content: can_manage_content(role),
            has_premium_access: has_premium_access(role),
            requires_upgrade: requires_upgrade(role),
            requires_login: role.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ROLES: [Option<Role>; 4] = [None, Some(Role::User), Some(Role::Subs), Some(Role::Admin)];

    #[test]
    fn each_role_extends_the_previous_one() {
        assert!(Role::User.permissions().is_subset(Role::Subs.permissions()));
        assert!(Role::Subs.permissions().is_subset(Role::Admin.permissions()));
        assert!(!Role::User.has_permission(Permission::ViewPremiumContent));
        assert!(!Role::Subs.has_permission(Permission::ManageUsers));
    }

    #[test]
    fn derived_capability_flags() {
        for role in ALL_ROLES {
            let premium = matches!(role, Some(Role::Subs) | Some(Role::Admin));
            assert_eq!(can_add_notes(role), premium, "can_add_notes({:?})", role);
            assert_eq!(has_premium_access(role), premium, "has_premium_access({:?})", role);
            assert_eq!(can_manage_content(role), role == Some(Role::Admin));
            assert_eq!(requires_upgrade(role), role == Some(Role::User));
        }
    }

    #[test]
    fn role_string_round_trip_rejects_unknown() {
        for role in [Role::User, Role::Subs, Role::Admin] {
            assert_eq!(Role::from_str(role.as_str()).unwrap(), role);
        }
        assert!(Role::from_str("coach").is_err());
        assert!(Role::from_str("Admin").is_err());
    }
}
