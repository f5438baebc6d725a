// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Duplicate suppression for SOAP-over-UDP retransmissions.
//!
//! Keyed on (AppSequence, MessageID) as WS-Discovery mandates; a repeat
//! seen inside the window is discarded before any dispatch. The LRU bound
//! keeps a hostile sender from growing the window without limit.

use crate::soap::AppSequence;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

const WINDOW_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    message_id: String,
    instance_id: u64,
    message_number: u64,
}

/// Sliding suppression window.
pub(crate) struct DedupWindow {
    seen: LruCache<DedupKey, Instant>,
    window: Duration,
}

impl DedupWindow {
    pub(crate) fn new(window: Duration) -> Self {
        let capacity = NonZeroUsize::new(WINDOW_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self { seen: LruCache::new(capacity), window }
    }

    /// Record a message; true when it repeats one seen within the window.
    pub(crate) fn is_duplicate(&mut self, message_id: &str, seq: Option<AppSequence>) -> bool {
        let key = DedupKey {
            message_id: message_id.to_string(),
            instance_id: seq.map(|s| s.instance_id).unwrap_or(0),
            message_number: seq.map(|s| s.message_number).unwrap_or(0),
        };
        let now = Instant::now();
        if let Some(first_seen) = self.seen.get(&key) {
            if now.duration_since(*first_seen) < self.window {
                return true;
            }
        }
        self.seen.put(key, now);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_inside_window_is_suppressed() {
        let mut w = DedupWindow::new(Duration::from_secs(10));
        let seq = Some(AppSequence { instance_id: 1, message_number: 7 });
        assert!(!w.is_duplicate("urn:uuid:m1", seq));
        assert!(w.is_duplicate("urn:uuid:m1", seq));
    }

    #[test]
    fn different_message_number_is_not_a_duplicate() {
        let mut w = DedupWindow::new(Duration::from_secs(10));
        assert!(!w.is_duplicate("urn:uuid:m1", Some(AppSequence { instance_id: 1, message_number: 1 })));
        assert!(!w.is_duplicate("urn:uuid:m1", Some(AppSequence { instance_id: 1, message_number: 2 })));
    }

    #[test]
    fn expired_window_forgets() {
        let mut w = DedupWindow::new(Duration::from_millis(0));
        assert!(!w.is_duplicate("urn:uuid:m1", None));
        // Zero window: the repeat is outside the window immediately.
        assert!(!w.is_duplicate("urn:uuid:m1", None));
    }
}
