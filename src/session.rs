//! Session store: the single subscription point for identity and role changes.

use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::auth::{Identity, Viewer, resolve_profile};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionState {
    pub viewer: Viewer,
    /// False until the first resolution completes.
    pub resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionTicket(u64);

pub struct SessionStore {
    tx: watch::Sender<SessionState>,
    generation: AtomicU64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self {
            tx,
            generation: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn begin_resolution(&self) -> ResolutionTicket {
        ResolutionTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Applies a resolution unless a newer one has started since `ticket` was taken.
    pub fn complete(&self, ticket: ResolutionTicket, viewer: Viewer) -> bool {
        let mut applied = false;

        self.tx.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != ticket.0 {
                return false;
            }
            applied = true;

            let next = SessionState {
                viewer,
                resolved: true,
            };
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });

        if !applied {
            debug!(ticket = ticket.0, "Discarding superseded session resolution");
        }
        applied
    }

    /// Resolves the profile for `identity` and publishes it. The returned viewer
    /// is this call's own result even if a newer resolution won the store.
    pub async fn resolve(&self, pool: &Pool<Sqlite>, identity: Option<Identity>) -> Viewer {
        let ticket = self.begin_resolution();
        let profile = resolve_profile(pool, identity.as_ref()).await;
        let viewer = Viewer::new(identity, profile);
        self.complete(ticket, viewer.clone());
        viewer
    }

    fn clear(&self) {
        let ticket = self.begin_resolution();
        self.complete(ticket, Viewer::anonymous());
    }
}

/// Dropping the subscription unsubscribes.
pub struct Subscription {
    rx: watch::Receiver<SessionState>,
}

impl Subscription {
    pub fn current(&mut self) -> SessionState {
        self.rx.borrow_and_update().clone()
    }

    /// Waits for the next published state; `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// One store per signed-in session token. Clones share the same stores.
#[derive(Default, Clone)]
pub struct SessionRegistry {
    stores: Arc<RwLock<HashMap<String, Arc<SessionStore>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_for(&self, token: &str) -> Arc<SessionStore> {
        if let Some(store) = self.get(token) {
            return store;
        }

        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        stores
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(SessionStore::new()))
            .clone()
    }

    pub fn get(&self, token: &str) -> Option<Arc<SessionStore>> {
        self.stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.stores.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Resolves the session to "no identity" and drops it.
    pub fn sign_out(&self, token: &str) {
        let removed = self
            .stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);

        if let Some(store) = removed {
            store.clear();
        }
    }

    pub fn forget<'a>(&self, tokens: impl IntoIterator<Item = &'a String>) -> usize {
        let mut count = 0;
        for token in tokens {
            if self.get(token).is_some() {
                self.sign_out(token);
                count += 1;
            }
        }
        count
    }

    /// Re-resolves every live session of `identity_id` after its profile changed.
    #[instrument(skip(self, pool))]
    pub async fn refresh_identity(&self, pool: &Pool<Sqlite>, identity_id: &str) -> usize {
        let stores: Vec<Arc<SessionStore>> = self
            .stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|store| store.current().viewer.identity_id() == Some(identity_id))
            .cloned()
            .collect();

        for store in &stores {
            let identity = store.current().viewer.identity;
            store.resolve(pool, identity).await;
        }

        if !stores.is_empty() {
            info!(sessions = stores.len(), "Re-resolved sessions after profile change");
        }
        stores.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ResolvedProfile, Role};

    fn viewer(id: &str, role: Role) -> Viewer {
        Viewer::new(
            Some(Identity {
                id: id.to_string(),
                email: format!("{}@example.com", id),
                display_name: None,
            }),
            ResolvedProfile {
                role: Some(role),
                username: Some(id.to_string()),
            },
        )
    }

    #[test]
    fn unresolved_until_first_completion() {
        let store = SessionStore::new();
        assert!(!store.current().resolved);

        let ticket = store.begin_resolution();
        assert!(store.complete(ticket, Viewer::anonymous()));
        assert!(store.current().resolved);
        assert_eq!(store.current().viewer.identity, None);
    }

    #[test]
    fn most_recent_resolution_wins() {
        let store = SessionStore::new();
        let stale = store.begin_resolution();
        let fresh = store.begin_resolution();

        assert!(store.complete(fresh, viewer("u1", Role::Subs)));
        assert!(!store.complete(stale, viewer("u1", Role::User)));
        assert_eq!(store.current().viewer.role(), Some(Role::Subs));
    }

    #[tokio::test]
    async fn subscribers_see_changes_and_end_when_store_is_dropped() {
        let registry = SessionRegistry::new();
        let store = registry.store_for("token-1");
        let mut subscription = store.subscribe();

        let ticket = store.begin_resolution();
        store.complete(ticket, viewer("u1", Role::User));
        let state = subscription.changed().await.expect("store alive");
        assert_eq!(state.viewer.role(), Some(Role::User));

        drop(store);
        registry.sign_out("token-1");
        let state = subscription.changed().await.expect("sign-out is published");
        assert_eq!(state.viewer.identity, None);
        assert!(subscription.changed().await.is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn store_for_reuses_the_same_store() {
        let registry = SessionRegistry::new();
        let a = registry.store_for("t");
        let b = registry.store_for("t");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.forget([&"t".to_string(), &"missing".to_string()]), 1);
    }
}
