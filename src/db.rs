use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::{
    auth::{DbIdentity, DbProfile, DbUserSession, Identity, Profile, Role, UserSession},
    error::AppError,
    models::{
        Announcement, ContentItem, DbAnnouncement, DbContentItem, DbFeedback, DbNote, DbTodo,
        DbUserAccount, Feedback, Note, Priority, Todo, UserAccount,
    },
};

#[derive(sqlx::FromRow)]
struct DbCredentials {
    id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
    password: Option<String>,
}

#[instrument(skip(pool))]
pub async fn find_credentials(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<(Identity, String)>, AppError> {
    info!("Looking up credentials by email");
    let row = sqlx::query_as::<_, DbCredentials>(
        "SELECT id, email, display_name, password FROM identities WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let password = row.password.unwrap_or_default();
        let identity = Identity::from(DbIdentity {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
        });
        (identity, password)
    }))
}

#[instrument(skip(pool))]
pub async fn get_identity(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Identity>, AppError> {
    info!("Fetching identity by ID");
    let row = sqlx::query_as::<_, DbIdentity>(
        "SELECT id, email, display_name FROM identities WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Identity::from))
}

/// Creates the identity and its profile (role `user`) in one transaction.
#[instrument(skip(pool, password_hash))]
pub async fn create_identity(
    pool: &Pool<Sqlite>,
    id: &str,
    email: &str,
    password_hash: &str,
    display_name: Option<&str>,
    username: &str,
) -> Result<Identity, AppError> {
    info!("Creating identity and profile");
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO identities (id, email, password, display_name, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(email)
    .bind(password_hash)
    .bind(display_name)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(AppError::mutation("insert identity"))?;

    sqlx::query("INSERT INTO profiles (id, username, role, created_at) VALUES (?, ?, 'user', ?)")
        .bind(id)
        .bind(username)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(AppError::mutation("insert profile"))?;

    tx.commit().await?;

    Ok(Identity {
        id: id.to_string(),
        email: email.to_string(),
        display_name: display_name.map(String::from),
    })
}

#[instrument(skip(pool))]
pub async fn get_profile(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Profile>, AppError> {
    info!("Fetching profile");
    let row = sqlx::query_as::<_, DbProfile>(
        "SELECT id, username, role, created_at FROM profiles WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Profile::from))
}

#[instrument(skip(pool))]
pub async fn list_user_accounts(pool: &Pool<Sqlite>) -> Result<Vec<UserAccount>, AppError> {
    info!("Listing user accounts");
    let rows = sqlx::query_as::<_, DbUserAccount>(
        "SELECT p.id, p.username, i.email, p.role, p.created_at
         FROM profiles p
         LEFT JOIN identities i ON i.id = p.id
         ORDER BY p.created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(UserAccount::from).collect())
}

#[instrument(skip(pool))]
pub async fn update_profile_role(
    pool: &Pool<Sqlite>,
    id: &str,
    role: Role,
) -> Result<u64, AppError> {
    info!("Updating profile role");
    let result = sqlx::query("UPDATE profiles SET role = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::mutation("update role"))?;

    Ok(result.rows_affected())
}

#[instrument(skip(pool))]
pub async fn update_profile_username(
    pool: &Pool<Sqlite>,
    id: &str,
    username: &str,
) -> Result<u64, AppError> {
    info!("Updating profile username");
    let result = sqlx::query("UPDATE profiles SET username = ? WHERE id = ?")
        .bind(username)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::mutation("update username"))?;

    Ok(result.rows_affected())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    identity_id: &str,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<UserSession, AppError> {
    info!("Creating user session");
    let created_at = Utc::now();

    let res = sqlx::query(
        "INSERT INTO user_sessions (identity_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(identity_id)
    .bind(token)
    .bind(created_at)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(UserSession {
        id: res.last_insert_rowid(),
        identity_id: identity_id.to_string(),
        token: token.to_string(),
        created_at,
        expires_at,
    })
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<Option<UserSession>, AppError> {
    info!("Getting session by token");
    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, identity_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(session.map(UserSession::from))
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");
    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

/// Deletes sessions expired at `now` and returns their tokens.
#[instrument(skip(pool))]
pub async fn take_expired_sessions(
    pool: &Pool<Sqlite>,
    now: DateTime<Utc>,
) -> Result<Vec<String>, AppError> {
    info!("Cleaning expired sessions");
    let sessions = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, identity_id, token, created_at, expires_at FROM user_sessions",
    )
    .fetch_all(pool)
    .await?;

    let expired: Vec<UserSession> = sessions
        .into_iter()
        .map(UserSession::from)
        .filter(|session| session.expires_at <= now)
        .collect();

    let mut tx = pool.begin().await?;
    for session in &expired {
        sqlx::query("DELETE FROM user_sessions WHERE id = ?")
            .bind(session.id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(expired.into_iter().map(|session| session.token).collect())
}

const CONTENT_COLUMNS: &str = "c.id, c.collection, c.title, c.description, c.file_path, c.user_id,
     p.username AS uploader, c.created_at
     FROM content_items c
     LEFT JOIN profiles p ON p.id = c.user_id";

#[instrument(skip(pool))]
pub async fn list_content(
    pool: &Pool<Sqlite>,
    collection: &str,
    owner_id: Option<&str>,
) -> Result<Vec<ContentItem>, AppError> {
    info!("Listing content items");
    let rows = sqlx::query_as::<_, DbContentItem>(&format!(
        "SELECT {} WHERE c.collection = ? AND (? IS NULL OR c.user_id = ?)
         ORDER BY c.created_at DESC, c.id DESC",
        CONTENT_COLUMNS
    ))
    .bind(collection)
    .bind(owner_id)
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ContentItem::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_content(pool: &Pool<Sqlite>, id: i64) -> Result<Option<ContentItem>, AppError> {
    info!("Fetching content item");
    let row = sqlx::query_as::<_, DbContentItem>(&format!("SELECT {} WHERE c.id = ?", CONTENT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(ContentItem::from))
}

#[instrument(skip(pool, description))]
pub async fn insert_content(
    pool: &Pool<Sqlite>,
    collection: &str,
    title: &str,
    description: &str,
    file_path: Option<&str>,
    user_id: &str,
    created_at: DateTime<Utc>,
) -> Result<i64, AppError> {
    info!("Inserting content item");
    let res = sqlx::query(
        "INSERT INTO content_items (collection, title, description, file_path, user_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(collection)
    .bind(title)
    .bind(description)
    .bind(file_path)
    .bind(user_id)
    .bind(created_at)
    .execute(pool)
    .await
    .map_err(AppError::mutation("insert content"))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, description))]
pub async fn update_content(
    pool: &Pool<Sqlite>,
    id: i64,
    title: &str,
    description: &str,
    file_path: Option<&str>,
) -> Result<u64, AppError> {
    info!("Updating content item");
    let res = sqlx::query(
        "UPDATE content_items SET title = ?, description = ?, file_path = ? WHERE id = ?",
    )
    .bind(title)
    .bind(description)
    .bind(file_path)
    .bind(id)
    .execute(pool)
    .await
    .map_err(AppError::mutation("update content"))?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn delete_content(pool: &Pool<Sqlite>, id: i64) -> Result<u64, AppError> {
    info!("Deleting content item");
    let res = sqlx::query("DELETE FROM content_items WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::mutation("delete content"))?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn count_content(pool: &Pool<Sqlite>, collection: &str) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM content_items WHERE collection = ?")
        .bind(collection)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

const NOTE_COLUMNS: &str = "n.id, n.user_id, n.content, p.username, n.created_at
     FROM notes n
     LEFT JOIN profiles p ON p.id = n.user_id";

/// Newest first, capped at `limit`; expiry is not applied here.
#[instrument(skip(pool))]
pub async fn list_notes(
    pool: &Pool<Sqlite>,
    owner_id: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<Note>, AppError> {
    info!("Listing notes");
    let rows = sqlx::query_as::<_, DbNote>(&format!(
        "SELECT {} WHERE (? IS NULL OR n.user_id = ?)
         ORDER BY n.created_at DESC, n.id DESC
         LIMIT ?",
        NOTE_COLUMNS
    ))
    .bind(owner_id)
    .bind(owner_id)
    // SQLite reads a negative LIMIT as no limit.
    .bind(limit.unwrap_or(-1))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Note::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_note(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Note>, AppError> {
    info!("Fetching note");
    let row = sqlx::query_as::<_, DbNote>(&format!("SELECT {} WHERE n.id = ?", NOTE_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Note::from))
}

#[instrument(skip(pool, content))]
pub async fn insert_note(
    pool: &Pool<Sqlite>,
    user_id: &str,
    content: &str,
    created_at: DateTime<Utc>,
) -> Result<i64, AppError> {
    info!("Inserting note");
    let res = sqlx::query("INSERT INTO notes (user_id, content, created_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(content)
        .bind(created_at)
        .execute(pool)
        .await
        .map_err(AppError::mutation("insert note"))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, content))]
pub async fn update_note(pool: &Pool<Sqlite>, id: i64, content: &str) -> Result<u64, AppError> {
    info!("Updating note");
    let res = sqlx::query("UPDATE notes SET content = ? WHERE id = ?")
        .bind(content)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::mutation("update note"))?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn delete_note(pool: &Pool<Sqlite>, id: i64) -> Result<u64, AppError> {
    info!("Deleting note");
    let res = sqlx::query("DELETE FROM notes WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::mutation("delete note"))?;

    Ok(res.rows_affected())
}

#[derive(sqlx::FromRow)]
struct DbNoteStamp {
    id: Option<i64>,
    created_at: Option<DateTime<Utc>>,
}

/// Every note's id and creation time, for the purge sweep.
#[instrument(skip(pool))]
pub async fn list_note_stamps(
    pool: &Pool<Sqlite>,
) -> Result<Vec<(i64, Option<DateTime<Utc>>)>, AppError> {
    let rows = sqlx::query_as::<_, DbNoteStamp>("SELECT id, created_at FROM notes")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| row.id.map(|id| (id, row.created_at)))
        .collect())
}

#[instrument(skip(pool, ids), fields(count = ids.len()))]
pub async fn delete_notes(pool: &Pool<Sqlite>, ids: &[i64]) -> Result<u64, AppError> {
    info!("Deleting notes in bulk");
    let mut tx = pool.begin().await?;
    let mut deleted = 0;

    for id in ids {
        deleted += sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(*id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    tx.commit().await?;
    Ok(deleted)
}

const TODO_COLUMNS: &str = "id, user_id, title, description, deadline, priority, done FROM todos";

#[instrument(skip(pool))]
pub async fn list_todos(pool: &Pool<Sqlite>, owner_id: Option<&str>) -> Result<Vec<Todo>, AppError> {
    info!("Listing todos");
    let rows = sqlx::query_as::<_, DbTodo>(&format!(
        "SELECT {} WHERE (? IS NULL OR user_id = ?) ORDER BY deadline ASC, id ASC",
        TODO_COLUMNS
    ))
    .bind(owner_id)
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Todo::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_todo(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Todo>, AppError> {
    info!("Fetching todo");
    let row = sqlx::query_as::<_, DbTodo>(&format!("SELECT {} WHERE id = ?", TODO_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Todo::from))
}

#[instrument(skip(pool, description))]
pub async fn insert_todo(
    pool: &Pool<Sqlite>,
    user_id: &str,
    title: &str,
    description: Option<&str>,
    deadline: DateTime<Utc>,
    priority: Priority,
) -> Result<i64, AppError> {
    info!("Inserting todo");
    let res = sqlx::query(
        "INSERT INTO todos (user_id, title, description, deadline, priority, done)
         VALUES (?, ?, ?, ?, ?, FALSE)",
    )
    .bind(user_id)
    .bind(title)
    .bind(description)
    .bind(deadline)
    .bind(priority.as_str())
    .execute(pool)
    .await
    .map_err(AppError::mutation("insert todo"))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, description))]
pub async fn update_todo(
    pool: &Pool<Sqlite>,
    id: i64,
    title: &str,
    description: Option<&str>,
    deadline: DateTime<Utc>,
    priority: Priority,
) -> Result<u64, AppError> {
    info!("Updating todo");
    let res = sqlx::query(
        "UPDATE todos SET title = ?, description = ?, deadline = ?, priority = ? WHERE id = ?",
    )
    .bind(title)
    .bind(description)
    .bind(deadline)
    .bind(priority.as_str())
    .bind(id)
    .execute(pool)
    .await
    .map_err(AppError::mutation("update todo"))?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn set_todo_done(pool: &Pool<Sqlite>, id: i64, done: bool) -> Result<u64, AppError> {
    info!("Setting todo completion");
    let res = sqlx::query("UPDATE todos SET done = ? WHERE id = ?")
        .bind(done)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::mutation("toggle todo"))?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn delete_todo(pool: &Pool<Sqlite>, id: i64) -> Result<u64, AppError> {
    info!("Deleting todo");
    let res = sqlx::query("DELETE FROM todos WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::mutation("delete todo"))?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn list_announcements(pool: &Pool<Sqlite>) -> Result<Vec<Announcement>, AppError> {
    info!("Listing announcements");
    let rows = sqlx::query_as::<_, DbAnnouncement>(
        "SELECT id, title, content, created_at FROM announcements ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Announcement::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_announcement(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<Option<Announcement>, AppError> {
    let row = sqlx::query_as::<_, DbAnnouncement>(
        "SELECT id, title, content, created_at FROM announcements WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Announcement::from))
}

#[instrument(skip(pool, content))]
pub async fn insert_announcement(
    pool: &Pool<Sqlite>,
    title: &str,
    content: &str,
    created_at: DateTime<Utc>,
) -> Result<i64, AppError> {
    info!("Inserting announcement");
    let res = sqlx::query("INSERT INTO announcements (title, content, created_at) VALUES (?, ?, ?)")
        .bind(title)
        .bind(content)
        .bind(created_at)
        .execute(pool)
        .await
        .map_err(AppError::mutation("insert announcement"))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, content))]
pub async fn update_announcement(
    pool: &Pool<Sqlite>,
    id: i64,
    title: &str,
    content: &str,
) -> Result<u64, AppError> {
    info!("Updating announcement");
    let res = sqlx::query("UPDATE announcements SET title = ?, content = ? WHERE id = ?")
        .bind(title)
        .bind(content)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::mutation("update announcement"))?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn delete_announcement(pool: &Pool<Sqlite>, id: i64) -> Result<u64, AppError> {
    info!("Deleting announcement");
    let res = sqlx::query("DELETE FROM announcements WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::mutation("delete announcement"))?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn list_feedback(pool: &Pool<Sqlite>) -> Result<Vec<Feedback>, AppError> {
    info!("Listing feedback");
    let rows = sqlx::query_as::<_, DbFeedback>(
        "SELECT id, user_id, email, username, message, created_at
         FROM feedback ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Feedback::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_feedback(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Feedback>, AppError> {
    let row = sqlx::query_as::<_, DbFeedback>(
        "SELECT id, user_id, email, username, message, created_at FROM feedback WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Feedback::from))
}

#[instrument(skip(pool, message))]
pub async fn insert_feedback(
    pool: &Pool<Sqlite>,
    user_id: &str,
    email: &str,
    username: &str,
    message: &str,
    created_at: DateTime<Utc>,
) -> Result<i64, AppError> {
    info!("Inserting feedback");
    let res = sqlx::query(
        "INSERT INTO feedback (user_id, email, username, message, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(email)
    .bind(username)
    .bind(message)
    .bind(created_at)
    .execute(pool)
    .await
    .map_err(AppError::mutation("insert feedback"))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn delete_feedback(pool: &Pool<Sqlite>, id: i64) -> Result<u64, AppError> {
    info!("Deleting feedback");
    let res = sqlx::query("DELETE FROM feedback WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::mutation("delete feedback"))?;

    Ok(res.rows_affected())
}
