//! Ownership and route predicates shared by every mediator and gate.

use serde::{Deserialize, Serialize};

use super::{Identity, Permission, Role, has_premium_access};

/// A stored record with a single owning identity.
pub trait Owned {
    fn owner_id(&self) -> &str;
}

/// Editing is ownership-only; no role overrides it.
pub fn can_edit_resource<R: Owned + ?Sized>(resource: &R, identity: &Identity) -> bool {
    resource.owner_id() == identity.id
}

/// Deleting is allowed to the owner or to any admin.
pub fn can_delete_resource<R: Owned + ?Sized>(
    resource: &R,
    identity: &Identity,
    role: Option<Role>,
) -> bool {
    resource.owner_id() == identity.id || role == Some(Role::Admin)
}

pub fn can_view_protected_route(role: Option<Role>) -> bool {
    has_premium_access(role)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessDecision {
    Granted,
    LoginRequired,
    UpgradeRequired,
    Denied,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }

    /// Client surface to show in place of the gated view.
    pub fn surface(&self) -> Option<&'static str> {
        match self {
            AccessDecision::Granted => None,
            AccessDecision::LoginRequired => Some("need-login"),
            AccessDecision::UpgradeRequired => Some("upgrade-required"),
            AccessDecision::Denied => Some("access-denied"),
        }
    }
}

/// Never conflates "not logged in" with "logged in but not entitled".
pub fn decide_access(
    identity: Option<&Identity>,
    role: Option<Role>,
    required: Permission,
) -> AccessDecision {
    if identity.is_none() {
        return AccessDecision::LoginRequired;
    }

    let role = role.unwrap_or(Role::User);

    if role.has_permission(required) {
        AccessDecision::Granted
    } else if role == Role::User && Role::Subs.has_permission(required) {
        AccessDecision::UpgradeRequired
    } else {
        AccessDecision::Denied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        owner: String,
    }

    impl Owned for Item {
        fn owner_id(&self) -> &str {
            &self.owner
        }
    }

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            display_name: None,
        }
    }

    const ROLES: [Option<Role>; 4] = [None, Some(Role::User), Some(Role::Subs), Some(Role::Admin)];

    #[test]
    fn protected_route_truth_table() {
        for role in ROLES {
            assert_eq!(
                can_view_protected_route(role),
                matches!(role, Some(Role::Subs) | Some(Role::Admin))
            );
        }
    }

    #[test]
    fn login_and_upgrade_fallbacks_never_swap() {
        let u1 = identity("u1");
        assert_eq!(
            decide_access(None, None, Permission::ViewPremiumContent),
            AccessDecision::LoginRequired
        );
        assert_eq!(
            decide_access(Some(&u1), Some(Role::User), Permission::ViewPremiumContent),
            AccessDecision::UpgradeRequired
        );
        assert_eq!(
            decide_access(Some(&u1), Some(Role::Subs), Permission::ViewPremiumContent),
            AccessDecision::Granted
        );
        assert_eq!(
            decide_access(Some(&u1), Some(Role::Subs), Permission::ManageUsers),
            AccessDecision::Denied
        );
        assert_eq!(
            decide_access(Some(&u1), Some(Role::User), Permission::ManageUsers),
            AccessDecision::Denied
        );
        // Unresolved role on a known identity behaves like the default role.
        assert_eq!(
            decide_access(Some(&u1), None, Permission::ViewPremiumContent),
            AccessDecision::UpgradeRequired
        );
    }

    #[test]
    fn edit_is_ownership_only_regardless_of_role() {
        let item = Item {
            owner: "u1".to_string(),
        };
        assert!(can_edit_resource(&item, &identity("u1")));
        assert!(!can_edit_resource(&item, &identity("u2")));
    }

    #[test]
    fn delete_is_owner_or_admin() {
        let item = Item {
            owner: "u1".to_string(),
        };
        for role in ROLES {
            assert!(can_delete_resource(&item, &identity("u1"), role));
            assert_eq!(
                can_delete_resource(&item, &identity("u2"), role),
                role == Some(Role::Admin)
            );
        }
    }
}
