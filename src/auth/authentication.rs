use rocket::Request;
use rocket::catch;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{Instrument, error, info_span, warn};

use crate::session::{SessionRegistry, SessionStore};
use crate::validation::ValidationResponse;

use super::{AccessDecision, AccessGate, Permission, Viewer, current_identity};

pub const SESSION_COOKIE: &str = "session_token";

/// Identity and profile resolved once per request.
pub struct Session {
    pub token: Option<String>,
    pub store: Arc<SessionStore>,
    pub viewer: Viewer,
}

impl Session {
    fn anonymous(store: Arc<SessionStore>) -> Self {
        Self {
            token: None,
            store,
            viewer: Viewer::anonymous(),
        }
    }
}

async fn resolve_session(request: &Request<'_>) -> Session {
    let ephemeral = Arc::new(SessionStore::new());

    let (Some(pool), Some(registry)) = (
        request.rocket().state::<Pool<Sqlite>>(),
        request.rocket().state::<SessionRegistry>(),
    ) else {
        error!("Database pool or session registry not found in managed state");
        return Session::anonymous(ephemeral);
    };

    let token = request
        .cookies()
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    let Some(token) = token else {
        let viewer = ephemeral.resolve(pool, None).await;
        return Session {
            token: None,
            store: ephemeral,
            viewer,
        };
    };

    match current_identity(pool, &token).await {
        Ok(Some(identity)) => {
            let store = registry.store_for(&token);
            let viewer = store.resolve(pool, Some(identity)).await;
            Session {
                token: Some(token),
                store,
                viewer,
            }
        }
        Ok(None) => {
            warn!("Session token unknown or expired");
            registry.sign_out(&token);
            let viewer = ephemeral.resolve(pool, None).await;
            Session {
                token: None,
                store: ephemeral,
                viewer,
            }
        }
        Err(err) => {
            warn!(error = %err, "Identity lookup failed, treating request as signed out");
            let viewer = ephemeral.resolve(pool, None).await;
            Session {
                token: None,
                store: ephemeral,
                viewer,
            }
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for &'r Session {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let session = request
            .local_cache_async(resolve_session(request).instrument(info_span!("session_guard")))
            .await;

        Outcome::Success(session)
    }
}

/// The viewer of the current request; anonymous when nobody is signed in.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for Viewer {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        request
            .guard::<&Session>()
            .await
            .map(|session| session.viewer.clone())
    }
}

/// Marker naming the permission a [`Gated`] route requires.
pub trait Requirement: Send + Sync + 'static {
    const PERMISSION: Permission;
}

pub struct NoteAuthor;
pub struct Member;
pub struct Administrator;

impl Requirement for NoteAuthor {
    const PERMISSION: Permission = Permission::AddNotes;
}

impl Requirement for Member {
    const PERMISSION: Permission = Permission::ManageOwnTodos;
}

impl Requirement for Administrator {
    const PERMISSION: Permission = Permission::ManageContent;
}

/// Decision of the last gate evaluated for this request, read by the catchers.
struct GateOutcome(Option<AccessDecision>);

/// Request guard that only succeeds when the viewer holds `C::PERMISSION`.
pub struct Gated<C: Requirement> {
    pub viewer: Viewer,
    _requirement: PhantomData<C>,
}

#[rocket::async_trait]
impl<'r, C: Requirement> FromRequest<'r> for Gated<C> {
    type Error = AccessDecision;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let session = match request.guard::<&Session>().await {
            Outcome::Success(session) => session,
            _ => return Outcome::Error((Status::InternalServerError, AccessDecision::Denied)),
        };

        let decision = AccessGate::new(C::PERMISSION).evaluate(&session.viewer);
        request.local_cache(|| GateOutcome(Some(decision)));

        match decision {
            AccessDecision::Granted => Outcome::Success(Gated {
                viewer: session.viewer.clone(),
                _requirement: PhantomData,
            }),
            AccessDecision::LoginRequired => Outcome::Error((Status::Unauthorized, decision)),
            _ => Outcome::Error((Status::Forbidden, decision)),
        }
    }
}

#[catch(401)]
pub fn unauthorized(req: &Request) -> Custom<Json<ValidationResponse>> {
    warn!(uri = %req.uri(), "Unauthenticated access attempt");

    Custom(
        Status::Unauthorized,
        Json(
            ValidationResponse::with_error("authentication", "Login required")
                .with_surface("need-login"),
        ),
    )
}

#[catch(403)]
pub fn forbidden(req: &Request) -> Custom<Json<ValidationResponse>> {
    let decision = req.local_cache(|| GateOutcome(None)).0;
    warn!(uri = %req.uri(), decision = ?decision, "Forbidden access attempt");

    let body = match decision {
        Some(AccessDecision::UpgradeRequired) => {
            ValidationResponse::with_error("authorization", "Premium membership required")
                .with_surface("upgrade-required")
        }
        _ => ValidationResponse::with_error(
            "permission",
            "You don't have permission to perform this action",
        )
        .with_surface("access-denied"),
    };

    Custom(Status::Forbidden, Json(body))
}
