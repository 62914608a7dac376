use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::tokio::select;
use rocket::{Shutdown, get};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{AccessDecision, Capabilities, Feature, Session};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub feature: String,
    pub decision: AccessDecision,
    pub surface: Option<String>,
}

impl GateDecision {
    fn new(feature: Feature, decision: AccessDecision) -> Self {
        Self {
            feature: feature.slug().to_string(),
            decision,
            surface: decision.surface().map(String::from),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GateResponse {
    #[serde(flatten)]
    pub gate: GateDecision,
    pub capabilities: Capabilities,
}

/// What the client should render for `feature` right now.
#[get("/gate/<feature>")]
pub fn probe(feature: Feature, session: &Session) -> Json<GateResponse> {
    let decision = feature.gate().evaluate(&session.viewer);

    Json(GateResponse {
        gate: GateDecision::new(feature, decision),
        capabilities: session.viewer.capabilities(),
    })
}

/// Streams a new decision whenever sign-in, sign-out or a role change flips it.
#[get("/gate/<feature>/watch")]
pub fn watch(feature: Feature, session: &Session, mut end: Shutdown) -> EventStream![] {
    let store = session.store.clone();
    let mut watch = feature.gate().watch(store.subscribe());
    let initial = watch.current();

    EventStream! {
        // Keeps the store alive for anonymous viewers as well.
        let _store = store;

        if let Some(decision) = initial {
            yield Event::json(&GateDecision::new(feature, decision)).event("decision");
        }

        loop {
            let decision = select! {
                decision = watch.next_change() => match decision {
                    Some(decision) => decision,
                    None => break,
                },
                _ = &mut end => break,
            };

            debug!(?decision, "Gate decision changed");
            yield Event::json(&GateDecision::new(feature, decision)).event("decision");
        }
    }
}
