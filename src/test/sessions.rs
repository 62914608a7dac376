#[cfg(test)]
mod tests {
    use crate::auth::{
        AccessDecision, Feature, Role, current_identity, sign_in, sign_out, sweep_expired_sessions,
    };
    use crate::db::{create_user_session, get_session_by_token};
    use crate::mediator::profiles;
    use crate::session::SessionRegistry;
    use crate::test::utils::test_utils::{STANDARD_PASSWORD, create_standard_test_db};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sign_in_issues_session() {
        let test_db = create_standard_test_db().await;

        let rejected = sign_in(&test_db.pool, "subs@example.com", "wrong_password", 24)
            .await
            .unwrap();
        assert!(rejected.is_none());

        let unknown = sign_in(&test_db.pool, "nobody@example.com", STANDARD_PASSWORD, 24)
            .await
            .unwrap();
        assert!(unknown.is_none());

        let (identity, session) = sign_in(&test_db.pool, " SUBS@example.com ", STANDARD_PASSWORD, 24)
            .await
            .unwrap()
            .expect("Valid credentials should sign in");

        assert_eq!(identity.email, "subs@example.com");
        assert_eq!(session.token.len(), 48);
        assert!(session.is_valid());

        let resolved = current_identity(&test_db.pool, &session.token).await.unwrap();
        assert_eq!(resolved, Some(identity));
    }

    #[tokio::test]
    async fn test_sign_out_clears_store_and_row() {
        let test_db = create_standard_test_db().await;
        let registry = SessionRegistry::new();
        let identity = test_db.identity("subs@example.com");

        let (_, session) = sign_in(&test_db.pool, "subs@example.com", STANDARD_PASSWORD, 24)
            .await
            .unwrap()
            .unwrap();

        let store = registry.store_for(&session.token);
        let viewer = store.resolve(&test_db.pool, Some(identity)).await;
        assert_eq!(viewer.role(), Some(Role::Subs));

        let mut subscription = store.subscribe();
        sign_out(&test_db.pool, &registry, &session.token).await.unwrap();

        let state = subscription.changed().await.expect("Store still alive");
        assert!(state.viewer.identity.is_none());
        assert!(registry.get(&session.token).is_none());
        assert!(
            get_session_by_token(&test_db.pool, &session.token)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_sessions() {
        let test_db = create_standard_test_db().await;
        let registry = SessionRegistry::new();
        let identity_id = test_db.identity_id("user@example.com");

        let expired = format!("expired_{}", Uuid::new_v4());
        let live = format!("live_{}", Uuid::new_v4());
        create_user_session(&test_db.pool, &identity_id, &expired, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        create_user_session(&test_db.pool, &identity_id, &live, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        registry.store_for(&expired);
        registry.store_for(&live);

        assert!(current_identity(&test_db.pool, &expired).await.unwrap().is_none());

        let swept = sweep_expired_sessions(&test_db.pool, &registry).await.unwrap();
        assert_eq!(swept, 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&live).is_some());
        assert!(get_session_by_token(&test_db.pool, &expired).await.unwrap().is_none());
        assert!(get_session_by_token(&test_db.pool, &live).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_role_change_reaches_live_sessions() {
        let test_db = create_standard_test_db().await;
        let registry = SessionRegistry::new();
        let identity = test_db.identity("user@example.com");

        let store = registry.store_for("token-of-user");
        store.resolve(&test_db.pool, Some(identity.clone())).await;

        let mut gate = Feature::Notes.gate().watch(store.subscribe());
        assert_eq!(gate.current(), Some(AccessDecision::UpgradeRequired));

        let refreshed = profiles::update_role(
            &test_db.pool,
            &registry,
            &test_db.viewer("admin@example.com"),
            &identity.id,
            Role::Subs,
        )
        .await
        .unwrap();
        assert_eq!(refreshed, 1);

        assert_eq!(gate.next_change().await, Some(AccessDecision::Granted));
        assert_eq!(store.current().viewer.role(), Some(Role::Subs));

        let denied = profiles::update_role(
            &test_db.pool,
            &registry,
            &test_db.viewer("subs@example.com"),
            &identity.id,
            Role::Admin,
        )
        .await;
        assert!(denied.is_err());
        assert_eq!(store.current().viewer.role(), Some(Role::Subs));
    }
}
