//! Time-windowed seen-set of packet ids.
//!
//! Each consumer owns its own register. Purge, check and insert happen under one lock
//! so concurrent ingestion tasks cannot both see an id as new.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct DedupRegister {
    window: Duration,
    seen: Mutex<HashMap<u32, Instant>>,
}

impl DedupRegister {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// `true` the first time `message_id` is seen within the window.
    pub fn see(&self, message_id: u32) -> bool {
        self.see_at(message_id, Instant::now())
    }

    pub fn see_at(&self, message_id: u32, now: Instant) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let window = self.window;
        seen.retain(|_, first_seen| now.saturating_duration_since(*first_seen) <= window);
        if seen.contains_key(&message_id) {
            return false;
        }
        seen.insert(message_id, now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
