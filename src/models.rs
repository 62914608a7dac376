use chrono::{DateTime, Utc};
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::{Owned, Role};
use crate::lifecycle::Timestamped;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    #[serde(rename = "materi")]
    Material,
    #[serde(rename = "latsol")]
    Practice,
}

impl ContentKind {
    pub const ALL: [ContentKind; 2] = [ContentKind::Material, ContentKind::Practice];

    pub fn slug(&self) -> &'static str {
        match self {
            ContentKind::Material => "materi",
            ContentKind::Practice => "latsol",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }
}

impl<'a> FromParam<'a> for ContentKind {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        ContentKind::from_slug(param).ok_or(param)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subtest {
    Pu,
    Pk,
    Pbm,
    Ppu,
    Lbi,
    Lbe,
    Pm,
}

impl Subtest {
    pub const ALL: [Subtest; 7] = [
        Subtest::Pu,
        Subtest::Pk,
        Subtest::Pbm,
        Subtest::Ppu,
        Subtest::Lbi,
        Subtest::Lbe,
        Subtest::Pm,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Subtest::Pu => "pu",
            Subtest::Pk => "pk",
            Subtest::Pbm => "pbm",
            Subtest::Ppu => "ppu",
            Subtest::Lbi => "lbi",
            Subtest::Lbe => "lbe",
            Subtest::Pm => "pm",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Subtest::Pu => "Penalaran Umum",
            Subtest::Pk => "Pengetahuan Kuantitatif",
            Subtest::Pbm => "Pemahaman Baca dan Menulis",
            Subtest::Ppu => "Pengetahuan & Pemahaman Umum",
            Subtest::Lbi => "Literasi Bahasa Indonesia",
            Subtest::Lbe => "Literasi Bahasa Inggris",
            Subtest::Pm => "Penalaran Matematika",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|subtest| subtest.slug() == slug)
    }
}

impl<'a> FromParam<'a> for Subtest {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        Subtest::from_slug(param).ok_or(param)
    }
}

/// One of the fourteen logical collections, e.g. `materi_pu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Collection {
    pub kind: ContentKind,
    pub subtest: Subtest,
}

impl Collection {
    pub fn new(kind: ContentKind, subtest: Subtest) -> Self {
        Self { kind, subtest }
    }

    pub fn all() -> impl Iterator<Item = Collection> {
        ContentKind::ALL.into_iter().flat_map(|kind| {
            Subtest::ALL
                .into_iter()
                .map(move |subtest| Collection::new(kind, subtest))
        })
    }

    pub fn name(&self) -> String {
        format!("{}_{}", self.kind.slug(), self.subtest.slug())
    }

    pub fn parse(name: &str) -> Option<Self> {
        let (kind, subtest) = name.split_once('_')?;
        Some(Self::new(
            ContentKind::from_slug(kind)?,
            Subtest::from_slug(subtest)?,
        ))
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.slug(), self.subtest.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub collection: String,
    pub title: String,
    pub description: String,
    pub file_path: Option<String>,
    pub file_url: Option<String>,
    pub user_id: String,
    pub uploader: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbContentItem {
    pub id: Option<i64>,
    pub collection: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub file_path: Option<String>,
    pub user_id: Option<String>,
    pub uploader: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<DbContentItem> for ContentItem {
    fn from(item: DbContentItem) -> Self {
        Self {
            id: item.id.unwrap_or_default(),
            collection: item.collection.unwrap_or_default(),
            title: item.title.unwrap_or_default(),
            description: item.description.unwrap_or_default(),
            file_path: item.file_path.filter(|path| !path.is_empty()),
            file_url: None,
            user_id: item.user_id.unwrap_or_default(),
            uploader: item.uploader.unwrap_or_else(|| "Pengguna".to_string()),
            created_at: item.created_at.unwrap_or_else(Utc::now),
        }
    }
}

impl Owned for ContentItem {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub user_id: String,
    pub content: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbNote {
    pub id: Option<i64>,
    pub user_id: Option<String>,
    pub content: Option<String>,
    pub username: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<DbNote> for Note {
    fn from(note: DbNote) -> Self {
        Self {
            id: note.id.unwrap_or_default(),
            user_id: note.user_id.unwrap_or_default(),
            content: note.content.unwrap_or_default(),
            username: note
                .username
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "Pengguna".to_string()),
            // A row without a timestamp is treated as already expired.
            created_at: note.created_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

impl Owned for Note {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

impl Timestamped for Note {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, anyhow::Error> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            _ => Err(anyhow::Error::msg(format!("Unknown priority: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub deadline: DateTime<Utc>,
    pub priority: Priority,
    pub done: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTodo {
    pub id: Option<i64>,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub priority: Option<String>,
    pub done: Option<bool>,
}

impl From<DbTodo> for Todo {
    fn from(todo: DbTodo) -> Self {
        Self {
            id: todo.id.unwrap_or_default(),
            user_id: todo.user_id.unwrap_or_default(),
            title: todo.title.unwrap_or_default(),
            description: todo.description.filter(|d| !d.is_empty()),
            deadline: todo.deadline.unwrap_or_else(Utc::now),
            priority: todo
                .priority
                .as_deref()
                .map(Priority::from_str)
                .and_then(Result::ok)
                .unwrap_or_default(),
            done: todo.done.unwrap_or_default(),
        }
    }
}

impl Owned for Todo {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAnnouncement {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<DbAnnouncement> for Announcement {
    fn from(announcement: DbAnnouncement) -> Self {
        Self {
            id: announcement.id.unwrap_or_default(),
            title: announcement.title.unwrap_or_default(),
            content: announcement.content.unwrap_or_default(),
            created_at: announcement.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbFeedback {
    pub id: Option<i64>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<DbFeedback> for Feedback {
    fn from(feedback: DbFeedback) -> Self {
        Self {
            id: feedback.id.unwrap_or_default(),
            user_id: feedback.user_id.unwrap_or_default(),
            email: feedback.email.unwrap_or_default(),
            username: feedback.username.unwrap_or_default(),
            message: feedback.message.unwrap_or_default(),
            created_at: feedback.created_at.unwrap_or_else(Utc::now),
        }
    }
}

impl Owned for Feedback {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

/// Profile joined with its identity's email, for the admin user list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserAccount {
    pub id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<DbUserAccount> for UserAccount {
    fn from(account: DbUserAccount) -> Self {
        Self {
            id: account.id.unwrap_or_default(),
            username: account.username.unwrap_or_default(),
            email: account.email.unwrap_or_else(|| "N/A".to_string()),
            role: account
                .role
                .as_deref()
                .map(Role::from_str)
                .and_then(Result::ok)
                .unwrap_or(Role::User),
            created_at: account.created_at.unwrap_or_else(Utc::now),
        }
    }
}
