//! Read-time expiry for ephemeral notes.
//!
//! A note exists for readers only while it is stored *and* live. Nothing here
//! deletes rows; the optional purge sweep in `main.rs` is hygiene on top.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const NOTE_TTL_HOURS: i64 = 24;

pub fn note_ttl() -> Duration {
    Duration::hours(NOTE_TTL_HOURS)
}

/// Anything carrying a creation timestamp.
pub trait Timestamped {
    fn created_at(&self) -> DateTime<Utc>;
}

/// The boundary is exclusive: at exactly `created_at + ttl` the item is gone.
pub fn is_live(created_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now - created_at < ttl
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remaining {
    pub hours: i64,
    pub minutes: i64,
    pub expires_at: DateTime<Utc>,
}

/// `None` once `remaining <= 0`; never a negative countdown.
pub fn time_remaining(
    created_at: DateTime<Utc>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Option<Remaining> {
    let expires_at = created_at + ttl;
    let remaining = expires_at - now;

    if remaining <= Duration::zero() {
        return None;
    }

    Some(Remaining {
        hours: remaining.num_hours(),
        minutes: remaining.num_minutes() % 60,
        expires_at,
    })
}

pub fn retain_live<T: Timestamped>(items: Vec<T>, ttl: Duration, now: DateTime<Utc>) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| is_live(item.created_at(), ttl, now))
        .collect()
}
