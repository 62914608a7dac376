use chrono::{DateTime, Utc};
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::tokio::select;
use rocket::tokio::sync::broadcast::error::RecvError;
use rocket::tokio::time::{Duration, interval};
use rocket::{Shutdown, State, delete, get, post, put};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{debug, warn};
use validator::{Validate, ValidationError};

use crate::auth::{Gated, NoteAuthor, Viewer, can_delete_resource, can_edit_resource};
use crate::config::AppConfig;
use crate::lifecycle::{Remaining, note_ttl, time_remaining};
use crate::mediator::notes::{self, NOTE_MAX_CHARS, NOTES_LIMIT, NoteEvent, NoteFeed};
use crate::mediator::view::ListView;
use crate::mediator::ResourceType;
use crate::models::Note;
use crate::validation::{JsonValidateExt, ToValidationResponse};

use super::{Ack, ApiResult};

/// Live feeds re-read the table this often so expired notes drop out.
const FEED_REFRESH: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize, Validate)]
pub struct NoteRequest {
    #[validate(custom(function = "note_length"))]
    pub content: String,
}

/// Counts characters after trimming, the way the note is stored.
fn note_length(content: &str) -> Result<(), ValidationError> {
    let length = content.trim().chars().count();
    if (1..=NOTE_MAX_CHARS).contains(&length) {
        Ok(())
    } else {
        Err(ValidationError::new("length").with_message("Note must be 1 to 280 characters".into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteResponse {
    #[serde(flatten)]
    pub note: Note,
    pub remaining: Option<Remaining>,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl NoteResponse {
    fn new(note: Note, viewer: &Viewer, now: DateTime<Utc>) -> Self {
        let (can_edit, can_delete) = match viewer.identity.as_ref() {
            Some(identity) => (
                can_edit_resource(&note, identity),
                can_delete_resource(&note, identity, viewer.role()),
            ),
            None => (false, false),
        };

        Self {
            remaining: time_remaining(note.created_at, note_ttl(), now),
            note,
            can_edit,
            can_delete,
        }
    }
}

fn respond(notes: Vec<Note>, viewer: &Viewer) -> Vec<NoteResponse> {
    let now = Utc::now();
    notes
        .into_iter()
        .map(|note| NoteResponse::new(note, viewer, now))
        .collect()
}

#[get("/notes")]
pub async fn list(
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> ApiResult<Vec<NoteResponse>> {
    let notes = notes::list(db, &viewer, config.policy(ResourceType::Notes), Utc::now()).await?;
    Ok(Json(respond(notes, &viewer)))
}

#[post("/notes", data = "<request>")]
pub async fn create(
    request: Json<NoteRequest>,
    author: Gated<NoteAuthor>,
    db: &State<Pool<Sqlite>>,
    feed: &State<NoteFeed>,
) -> ApiResult<NoteResponse> {
    let request = request.validate_custom()?;
    let now = Utc::now();
    let note = notes::create(db, feed, &author.viewer, &request.content, now).await?;

    Ok(Json(NoteResponse::new(note, &author.viewer, now)))
}

#[put("/notes/<id>", data = "<request>")]
pub async fn update(
    id: i64,
    request: Json<NoteRequest>,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    feed: &State<NoteFeed>,
) -> ApiResult<NoteResponse> {
    let request = request.validate_custom()?;
    let now = Utc::now();
    let note = notes::update(db, feed, &viewer, id, &request.content, now).await?;

    Ok(Json(NoteResponse::new(note, &viewer, now)))
}

#[delete("/notes/<id>")]
pub async fn delete(
    id: i64,
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    feed: &State<NoteFeed>,
) -> ApiResult<Ack> {
    notes::delete(db, feed, &viewer, id, Utc::now()).await?;
    Ok(Ack::ok())
}

enum Wake {
    Refresh,
    Changed(NoteEvent),
}

/// Streams the viewer's note list. Mutations from other sessions show up
/// immediately; the periodic refresh reconciles and drops expired notes.
#[get("/notes/feed")]
pub fn feed(
    viewer: Viewer,
    db: &State<Pool<Sqlite>>,
    feed: &State<NoteFeed>,
    config: &State<AppConfig>,
    mut end: Shutdown,
) -> EventStream![] {
    let pool = db.inner().clone();
    let policy = config.policy(ResourceType::Notes);
    let mut events = feed.subscribe();

    EventStream! {
        let mut view = ListView::with_cap(NOTES_LIMIT as usize);
        let mut refresh = interval(FEED_REFRESH);

        loop {
            let wake = select! {
                _ = refresh.tick() => Wake::Refresh,
                event = events.recv() => match event {
                    Ok(event) => Wake::Changed(event),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Note feed lagged, refetching");
                        Wake::Refresh
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = &mut end => break,
            };

            let refetch = match wake {
                Wake::Refresh | Wake::Changed(NoteEvent::Updated(_)) => true,
                Wake::Changed(NoteEvent::Created(note)) => {
                    let visible = match policy.scope(&viewer) {
                        Ok(scope) => scope.owner().is_none_or(|owner| owner == note.user_id),
                        Err(_) => false,
                    };
                    if visible {
                        view.apply_optimistic(note);
                    }
                    false
                }
                Wake::Changed(NoteEvent::Deleted { id }) => {
                    view.remove_where(|note: &Note| note.id == id);
                    false
                }
            };

            if refetch {
                let ticket = view.begin_fetch();
                match notes::list(&pool, &viewer, policy, Utc::now()).await {
                    Ok(fresh) => {
                        view.apply_fetch(ticket, fresh);
                    }
                    Err(err) => {
                        warn!(error = %err, "Note feed refused");
                        let response = err.to_validation_response();
                        yield Event::json(&response.1.into_inner()).event("error");
                        break;
                    }
                }
            }

            yield Event::json(&respond(view.items(), &viewer)).event("notes");
        }

        view.unmount();
    }
}
