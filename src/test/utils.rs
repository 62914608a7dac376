#[cfg(test)]
pub mod test_utils {
    use crate::api::Blobs;
    use crate::auth::{Identity, ResolvedProfile, Role, Viewer, sign_up};
    use crate::config::AppConfig;
    use crate::db::{insert_content, insert_note, update_profile_role};
    use crate::error::AppError;
    use crate::models::Collection;
    use crate::session::SessionRegistry;
    use crate::storage::memory::MemoryBlobStore;
    use chrono::{DateTime, Utc};
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::{Pool, Sqlite, SqlitePool};
    use std::collections::HashMap;
    use std::sync::{Arc, Once};
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    pub struct TestUser {
        pub email: String,
        pub username: String,
        pub role: Role,
    }

    pub struct TestNote {
        pub email: String,
        pub content: String,
        pub created_at: DateTime<Utc>,
    }

    pub struct TestContent {
        pub email: String,
        pub collection: Collection,
        pub title: String,
        pub file_path: Option<String>,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        notes: Vec<TestNote>,
        content: Vec<TestContent>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user_with_role(mut self, email: &str, username: &str, role: Role) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                username: username.to_string(),
                role,
            });
            self
        }

        pub fn user(self, email: &str, username: &str) -> Self {
            self.user_with_role(email, username, Role::User)
        }

        pub fn subscriber(self, email: &str, username: &str) -> Self {
            self.user_with_role(email, username, Role::Subs)
        }

        pub fn admin(self, email: &str, username: &str) -> Self {
            self.user_with_role(email, username, Role::Admin)
        }

        pub fn note(mut self, email: &str, content: &str, created_at: DateTime<Utc>) -> Self {
            self.notes.push(TestNote {
                email: email.to_string(),
                content: content.to_string(),
                created_at,
            });
            self
        }

        pub fn content(
            mut self,
            email: &str,
            collection: Collection,
            title: &str,
            file_path: Option<&str>,
        ) -> Self {
            self.content.push(TestContent {
                email: email.to_string(),
                collection,
                title: title.to_string(),
                file_path: file_path.map(String::from),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            let pool = SqlitePool::connect("sqlite::memory:").await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut identities: HashMap<String, Identity> = HashMap::new();

            for user in &self.users {
                let identity =
                    sign_up(&pool, &user.email, STANDARD_PASSWORD, Some(&user.username)).await?;

                if user.role != Role::User {
                    update_profile_role(&pool, &identity.id, user.role).await?;
                }

                identities.insert(user.email.clone(), identity);
            }

            let mut note_ids = Vec::new();
            for note in &self.notes {
                let identity = &identities[&note.email];
                note_ids.push(insert_note(&pool, &identity.id, &note.content, note.created_at).await?);
            }

            let mut content_ids = Vec::new();
            for item in &self.content {
                let identity = &identities[&item.email];
                let id = insert_content(
                    &pool,
                    &item.collection.name(),
                    &item.title,
                    "",
                    item.file_path.as_deref(),
                    &identity.id,
                    Utc::now(),
                )
                .await?;
                content_ids.push(id);
            }

            let roles = self
                .users
                .iter()
                .map(|user| (user.email.clone(), user.role))
                .collect();

            Ok(TestDb {
                pool,
                identities,
                roles,
                note_ids,
                content_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub identities: HashMap<String, Identity>,
        pub roles: HashMap<String, Role>,
        pub note_ids: Vec<i64>,
        pub content_ids: Vec<i64>,
    }

    impl TestDb {
        pub fn identity(&self, email: &str) -> Identity {
            self.identities
                .get(email)
                .cloned()
                .unwrap_or_else(|| panic!("No test identity for {}", email))
        }

        pub fn identity_id(&self, email: &str) -> String {
            self.identity(email).id
        }

        /// Viewer as the request guard would resolve it for `email`.
        pub fn viewer(&self, email: &str) -> Viewer {
            let identity = self.identity(email);
            let username = identity.display_name.clone();

            Viewer::new(
                Some(identity),
                ResolvedProfile {
                    role: self.roles.get(email).copied(),
                    username,
                },
            )
        }
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .user("user@example.com", "regular")
            .subscriber("subs@example.com", "premium")
            .subscriber("other@example.com", "other_premium")
            .admin("admin@example.com", "boss")
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub async fn setup_test_client_with(
        test_db: &TestDb,
        config: AppConfig,
    ) -> (Client, Arc<MemoryBlobStore>) {
        let store = Arc::new(MemoryBlobStore::new());
        let blobs: Blobs = store.clone();

        let rocket = crate::init_rocket(test_db.pool.clone(), SessionRegistry::new(), config, blobs);
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to build Rocket client");

        (client, store)
    }

    pub async fn setup_test_client(test_db: &TestDb) -> (Client, Arc<MemoryBlobStore>) {
        setup_test_client_with(test_db, AppConfig::for_tests()).await
    }

    pub async fn login_test_user(client: &Client, email: &str) {
        let response = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": email,
                    "password": STANDARD_PASSWORD
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "Login failed for {}", email);
    }
}
