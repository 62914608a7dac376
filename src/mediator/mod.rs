//! Capability-checked list/create/update/delete per resource type.
//!
//! Every mutation runs its predicate before touching storage; a denied
//! attempt returns an error and performs nothing.

pub mod announcements;
pub mod content;
pub mod feedback;
pub mod notes;
pub mod profiles;
pub mod todos;
pub mod view;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::auth::{Permission, Viewer};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Content,
    Notes,
    Todos,
    Announcements,
    Feedback,
    Profiles,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Content,
        ResourceType::Notes,
        ResourceType::Todos,
        ResourceType::Announcements,
        ResourceType::Feedback,
        ResourceType::Profiles,
    ];

    pub fn env_key(&self) -> &'static str {
        match self {
            ResourceType::Content => "READ_POLICY_CONTENT",
            ResourceType::Notes => "READ_POLICY_NOTES",
            ResourceType::Todos => "READ_POLICY_TODOS",
            ResourceType::Announcements => "READ_POLICY_ANNOUNCEMENTS",
            ResourceType::Feedback => "READ_POLICY_FEEDBACK",
            ResourceType::Profiles => "READ_POLICY_PROFILES",
        }
    }

    pub fn default_policy(&self) -> ReadPolicy {
        match self {
            ResourceType::Content => ReadPolicy::Premium,
            ResourceType::Notes => ReadPolicy::Public,
            ResourceType::Todos => ReadPolicy::Owner,
            ResourceType::Announcements => ReadPolicy::Public,
            ResourceType::Feedback => ReadPolicy::Admin,
            ResourceType::Profiles => ReadPolicy::Admin,
        }
    }
}

/// Who may list a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPolicy {
    Public,
    Authenticated,
    Premium,
    Owner,
    Admin,
}

impl ReadPolicy {
    pub fn from_str(s: &str) -> Result<Self, anyhow::Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(ReadPolicy::Public),
            "authenticated" => Ok(ReadPolicy::Authenticated),
            "premium" => Ok(ReadPolicy::Premium),
            "owner" => Ok(ReadPolicy::Owner),
            "admin" => Ok(ReadPolicy::Admin),
            other => Err(anyhow::Error::msg(format!("Unknown read policy: {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPolicy::Public => "public",
            ReadPolicy::Authenticated => "authenticated",
            ReadPolicy::Premium => "premium",
            ReadPolicy::Owner => "owner",
            ReadPolicy::Admin => "admin",
        }
    }

    /// Rows the viewer may list under this policy.
    pub fn scope(&self, viewer: &Viewer) -> Result<ReadScope, AppError> {
        match self {
            ReadPolicy::Public => Ok(ReadScope::All),
            ReadPolicy::Authenticated => {
                viewer.require_identity()?;
                Ok(ReadScope::All)
            }
            ReadPolicy::Premium => {
                viewer.require_permission(Permission::ViewPremiumContent)?;
                Ok(ReadScope::All)
            }
            ReadPolicy::Owner => {
                let identity = viewer.require_identity()?;
                Ok(ReadScope::OwnedBy(identity.id.clone()))
            }
            ReadPolicy::Admin => {
                let identity = viewer.require_identity()?;
                if viewer.is_admin() {
                    Ok(ReadScope::All)
                } else {
                    Err(AppError::Authorization(format!(
                        "identity {} is not an admin",
                        identity.id
                    )))
                }
            }
        }
    }
}

impl fmt::Display for ReadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadScope {
    All,
    OwnedBy(String),
}

impl ReadScope {
    pub fn owner(&self) -> Option<&str> {
        match self {
            ReadScope::All => None,
            ReadScope::OwnedBy(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPolicies {
    policies: HashMap<ResourceType, ReadPolicy>,
}

impl Default for ReadPolicies {
    fn default() -> Self {
        Self {
            policies: ResourceType::ALL
                .into_iter()
                .map(|resource| (resource, resource.default_policy()))
                .collect(),
        }
    }
}

impl ReadPolicies {
    pub fn get(&self, resource: ResourceType) -> ReadPolicy {
        self.policies
            .get(&resource)
            .copied()
            .unwrap_or_else(|| resource.default_policy())
    }

    pub fn with(mut self, resource: ResourceType, policy: ReadPolicy) -> Self {
        self.policies.insert(resource, policy);
        self
    }
}

/// A list query that fails shows as an empty list rather than an error.
pub(crate) fn rows_or_empty<T>(result: Result<Vec<T>, AppError>, what: &str) -> Vec<T> {
    result.unwrap_or_else(|err| {
        warn!(resource = what, error = %err, "List query failed, showing nothing");
        Vec::new()
    })
}

/// Fails with `NotFound` unless a mutation touched exactly the target row.
pub(crate) fn expect_affected(rows: u64, what: &str, id: impl fmt::Display) -> Result<(), AppError> {
    if rows == 0 {
        Err(AppError::NotFound(format!("{} {}", what, id)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, ResolvedProfile, Role};

    fn viewer(role: Role) -> Viewer {
        Viewer::new(
            Some(Identity {
                id: "u1".to_string(),
                email: "u1@example.com".to_string(),
                display_name: None,
            }),
            ResolvedProfile {
                role: Some(role),
                username: Some("u1".to_string()),
            },
        )
    }

    #[test]
    fn scopes_per_policy() {
        let anonymous = Viewer::anonymous();

        assert_eq!(ReadPolicy::Public.scope(&anonymous).unwrap(), ReadScope::All);
        assert!(matches!(
            ReadPolicy::Authenticated.scope(&anonymous),
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            ReadPolicy::Premium.scope(&viewer(Role::User)),
            Err(AppError::UpgradeRequired(_))
        ));
        assert_eq!(
            ReadPolicy::Premium.scope(&viewer(Role::Subs)).unwrap(),
            ReadScope::All
        );
        assert_eq!(
            ReadPolicy::Owner.scope(&viewer(Role::Admin)).unwrap(),
            ReadScope::OwnedBy("u1".to_string())
        );
        assert!(matches!(
            ReadPolicy::Admin.scope(&viewer(Role::Subs)),
            Err(AppError::Authorization(_))
        ));
    }

    #[test]
    fn defaults_can_be_overridden() {
        let policies = ReadPolicies::default();
        assert_eq!(policies.get(ResourceType::Content), ReadPolicy::Premium);
        assert_eq!(policies.get(ResourceType::Todos), ReadPolicy::Owner);

        let policies = policies.with(ResourceType::Content, ReadPolicy::Authenticated);
        assert_eq!(policies.get(ResourceType::Content), ReadPolicy::Authenticated);
        assert_eq!(ReadPolicy::from_str(" Admin ").unwrap(), ReadPolicy::Admin);
        assert!(ReadPolicy::from_str("everyone").is_err());
    }
}
