use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};

/// Opaque `(timestamp, id)` pagination cursor, shared by every
/// derived listing that isn't a direct event scan (tasks, insights rows).
/// `storage::memory` has its own copy scoped to raw event pagination; this
/// one works over derived ids, which are plain strings rather than `Uuid`s.
pub fn encode(ts: DateTime<Utc>, id: &str) -> String {
    let raw = format!("{}|{}", ts.to_rfc3339(), id);
    URL_SAFE_NO_PAD.encode(raw)
}

pub fn decode(cursor: &str) -> Option<(DateTime<Utc>, String)> {
    let raw = URL_SAFE_NO_PAD.decode(cursor).ok()?;
    let raw = String::from_utf8(raw).ok()?;
    let (ts, id) = raw.split_once('|')?;
    let ts = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
    Some((ts, id.to_string()))
}

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 200;

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT).max(1)
}
