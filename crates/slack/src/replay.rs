use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Remembers recently seen delivery keys so platform retries are not dispatched twice.
/// Each key is kept until its expiry, which is never earlier than `now + retention`.
#[derive(Debug)]
pub struct ReplayGuard {
    retention: chrono::Duration,
    max_entries: usize,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION, DEFAULT_MAX_ENTRIES)
    }
}

impl ReplayGuard {
    pub fn new(retention: Duration, max_entries: usize) -> Self {
        let retention =
            chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::minutes(5));
        Self { retention, max_entries: max_entries.max(1), seen: Mutex::new(HashMap::new()) }
    }

    /// Atomically records `key`. Returns `true` the first time a key is seen within the
    /// retention window and `false` for every repeat.
    pub fn check_and_record(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.check_and_record_until(key, now, now)
    }

    /// Like [`check_and_record`](Self::check_and_record), but keeps the key until at
    /// least `still_valid_until + retention`. A request stamped in the future stays
    /// fresh past `now + retention`, so its key must outlive that too.
    pub fn check_and_record_until(
        &self,
        key: &str,
        now: DateTime<Utc>,
        still_valid_until: DateTime<Utc>,
    ) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        seen.retain(|_, expires_at| *expires_at > now);

        if seen.contains_key(key) {
            return false;
        }

        if seen.len() >= self.max_entries {
            if let Some(oldest) =
                seen.iter().min_by_key(|(_, expires_at)| **expires_at).map(|(k, _)| k.clone())
            {
                seen.remove(&oldest);
            }
        }

        seen.insert(key.to_owned(), now.max(still_valid_until) + self.retention);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
