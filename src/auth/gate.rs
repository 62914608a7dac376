use rocket::request::FromParam;

use crate::session::{SessionState, Subscription};

use super::{AccessDecision, Permission, Viewer, decide_access};

/// Gated areas of the portal, addressable by slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Materials,
    Practice,
    Notes,
    Todos,
    Feedback,
    Admin,
}

impl Feature {
    pub fn permission(self) -> Permission {
        match self {
            Feature::Materials | Feature::Practice => Permission::ViewPremiumContent,
            Feature::Notes => Permission::AddNotes,
            Feature::Todos => Permission::ManageOwnTodos,
            Feature::Feedback => Permission::SendFeedback,
            Feature::Admin => Permission::ManageContent,
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Feature::Materials => "materi",
            Feature::Practice => "latsol",
            Feature::Notes => "notes",
            Feature::Todos => "todos",
            Feature::Feedback => "feedback",
            Feature::Admin => "admin",
        }
    }

    pub fn gate(self) -> AccessGate {
        AccessGate::new(self.permission())
    }
}

impl<'a> FromParam<'a> for Feature {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        match param {
            "materi" | "materials" => Ok(Feature::Materials),
            "latsol" | "practice" => Ok(Feature::Practice),
            "notes" => Ok(Feature::Notes),
            "todo" | "todos" => Ok(Feature::Todos),
            "feedback" => Ok(Feature::Feedback),
            "admin" => Ok(Feature::Admin),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGate {
    required: Permission,
}

impl AccessGate {
    pub fn new(required: Permission) -> Self {
        Self { required }
    }

    pub fn required(&self) -> Permission {
        self.required
    }

    pub fn evaluate(&self, viewer: &Viewer) -> AccessDecision {
        decide_access(viewer.identity.as_ref(), viewer.role(), self.required)
    }

    /// `None` while the session has not resolved yet.
    pub fn evaluate_state(&self, state: &SessionState) -> Option<AccessDecision> {
        state.resolved.then(|| self.evaluate(&state.viewer))
    }

    /// Produces the content or the fallback matching the failure reason.
    pub fn render<T>(
        &self,
        viewer: &Viewer,
        content: impl FnOnce() -> T,
        login_fallback: impl FnOnce() -> T,
        insufficient_role_fallback: impl FnOnce(AccessDecision) -> T,
    ) -> T {
        match self.evaluate(viewer) {
            AccessDecision::Granted => content(),
            AccessDecision::LoginRequired => login_fallback(),
            denied => insufficient_role_fallback(denied),
        }
    }

    pub fn watch(self, subscription: Subscription) -> GateWatch {
        GateWatch {
            gate: self,
            subscription,
            last: None,
        }
    }
}

/// Re-evaluates a gate on every session change without re-subscribing.
pub struct GateWatch {
    gate: AccessGate,
    subscription: Subscription,
    last: Option<AccessDecision>,
}

impl GateWatch {
    pub fn current(&mut self) -> Option<AccessDecision> {
        let state = self.subscription.current();
        let decision = self.gate.evaluate_state(&state);
        if decision.is_some() {
            self.last = decision;
        }
        decision
    }

    /// Waits until the decision differs from the last one observed.
    pub async fn next_change(&mut self) -> Option<AccessDecision> {
        loop {
            let state = self.subscription.changed().await?;
            let Some(decision) = self.gate.evaluate_state(&state) else {
                continue;
            };
            if self.last != Some(decision) {
                self.last = Some(decision);
                return Some(decision);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, ResolvedProfile, Role};
    use crate::session::SessionStore;

    fn signed_in(role: Role) -> Viewer {
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
    fn render_picks_fallback_by_failure_reason() {
        let gate = Feature::Materials.gate();
        let render = |viewer: &Viewer| {
            gate.render(
                viewer,
                || "content".to_string(),
                || "login".to_string(),
                |decision| format!("fallback:{:?}", decision),
            )
        };

        assert_eq!(render(&Viewer::anonymous()), "login");
        assert_eq!(render(&signed_in(Role::User)), "fallback:UpgradeRequired");
        assert_eq!(render(&signed_in(Role::Subs)), "content");
        assert_eq!(
            Feature::Admin.gate().render(&signed_in(Role::Subs), || 1, || 2, |_| 3),
            3
        );
    }

    #[tokio::test]
    async fn watch_unlocks_on_role_change_without_resubscribing() {
        let store = SessionStore::new();
        let mut watch = Feature::Materials.gate().watch(store.subscribe());
        assert_eq!(watch.current(), None);

        let ticket = store.begin_resolution();
        store.complete(ticket, signed_in(Role::User));
        assert_eq!(watch.next_change().await, Some(AccessDecision::UpgradeRequired));

        // A username-only change does not emit a new decision.
        let mut renamed = signed_in(Role::User);
        renamed.profile.username = Some("renamed".to_string());
        let ticket = store.begin_resolution();
        store.complete(ticket, renamed);

        let ticket = store.begin_resolution();
        store.complete(ticket, signed_in(Role::Admin));
        assert_eq!(watch.next_change().await, Some(AccessDecision::Granted));
    }

    #[test]
    fn feature_slugs() {
        assert_eq!(Feature::from_param("latsol"), Ok(Feature::Practice));
        assert_eq!(Feature::from_param("todo"), Ok(Feature::Todos));
        assert!(Feature::from_param("unknown").is_err());
        assert_eq!(Feature::from_param(Feature::Materials.slug()), Ok(Feature::Materials));
    }
}
