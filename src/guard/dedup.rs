//! Duplicate suppression for inbound broker messages

use std::time::{Duration, Instant};

use ahash::AHashMap;
use bytes::Bytes;

/// Last observation on a topic
#[derive(Debug, Clone)]
struct DedupEntry {
    last_seen_at: Instant,
    last_payload: Bytes,
}

/// Suppresses an inbound message when the same payload was seen on the
/// same topic less than `window` ago.
///
/// Keeps one entry per topic. Entries are overwritten, never accumulated,
/// so memory is bounded by the number of distinct topics.
#[derive(Debug)]
pub struct DedupGuard {
    window: Duration,
    entries: AHashMap<String, DedupEntry>,
}

impl DedupGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: AHashMap::new(),
        }
    }

    /// Returns true if the message duplicates the last one on `topic`.
    ///
    /// A suppressed message leaves the entry untouched; any other message
    /// becomes the new entry for the topic.
    pub fn should_suppress(&mut self, topic: &str, payload: &[u8], now: Instant) -> bool {
        if let Some(entry) = self.entries.get(topic) {
            if entry.last_payload == payload
                && now.saturating_duration_since(entry.last_seen_at) < self.window
            {
                return true;
            }
        }

        self.record(topic, payload, now);
        false
    }

    /// Store `payload` as the latest observation on `topic`
    pub fn record(&mut self, topic: &str, payload: &[u8], now: Instant) {
        match self.entries.get_mut(topic) {
            Some(entry) => {
                entry.last_seen_at = now;
                if entry.last_payload != payload {
                    entry.last_payload = Bytes::copy_from_slice(payload);
                }
            }
            None => {
                self.entries.insert(
                    topic.to_string(),
                    DedupEntry {
                        last_seen_at: now,
                        last_payload: Bytes::copy_from_slice(payload),
                    },
                );
            }
        }
    }

    /// Number of topics tracked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
