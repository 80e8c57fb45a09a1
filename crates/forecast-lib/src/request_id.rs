//! Request identifiers
//!
//! Generated ids are UTC timestamps with 100µs resolution
//! (`YYYYMMDDHHMMSSffff`), bumped when needed so they strictly increase
//! within the process.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Header carrying the request id in both directions
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied id that is accepted as-is
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    last: AtomicU64,
}

impl RequestIdGenerator {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        self.next_at(Utc::now())
    }

    fn next_at(&self, now: DateTime<Utc>) -> String {
        let candidate = timestamp_value(now);
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        candidate.max(previous + 1).to_string()
    }

    /// The caller's id when usable, otherwise a fresh one
    pub fn resolve(&self, supplied: Option<&str>) -> String {
        supplied
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
            .map(str::to_string)
            .unwrap_or_else(|| self.next_id())
    }
}

fn timestamp_value(now: DateTime<Utc>) -> u64 {
    let stamp = now.format("%Y%m%d%H%M%S").to_string();
    let fraction = now.timestamp_subsec_micros() / 100;
    format!("{}{:04}", stamp, fraction).parse().unwrap_or(0)
}
