//! Self-echo detection for resets the bridge publishes
//!
//! `command/reset` is shared by hardware and the bridge, so a reset the
//! bridge publishes comes back on its own subscription. Each outbound reset
//! carries a fresh token; the first inbound reset carrying that token is
//! the echo and is absorbed. Tokens that never come back expire after `ttl`.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use uuid::Uuid;

#[derive(Debug)]
pub struct LoopGuard {
    ttl: Duration,
    /// token -> creation time
    outstanding: AHashMap<String, Instant>,
}

impl LoopGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            outstanding: AHashMap::new(),
        }
    }

    /// Issue a token for a reset the bridge is about to publish
    pub fn begin_self_reset(&mut self, now: Instant) -> String {
        let token = Uuid::new_v4().to_string();
        self.outstanding.insert(token.clone(), now);
        token
    }

    /// Returns true if `token` was issued by this guard and has not been
    /// consumed or expired. Consumes the token either way.
    pub fn is_self_echo(&mut self, token: &str, now: Instant) -> bool {
        match self.outstanding.remove(token) {
            Some(created_at) => now.saturating_duration_since(created_at) < self.ttl,
            None => false,
        }
    }

    /// Drop every token older than the ttl, returning how many were removed
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.outstanding.len();
        let ttl = self.ttl;
        self.outstanding
            .retain(|_, created_at| now.saturating_duration_since(*created_at) < ttl);
        before - self.outstanding.len()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.outstanding.contains_key(token)
    }

    /// Number of tokens still waiting for an echo
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
