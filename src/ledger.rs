//! Idempotency ledger: a short-lived record of already-applied push events.
//!
//! Reconnects replay buffered notifications, and the push channel makes no
//! cross-epoch ordering promise. Events already seen here are dropped before
//! they reach the session state machine, so a replay never triggers a second
//! reconciliation fetch.

use crate::types::CallId;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};

/// Identity of one applied event: call, event type, and whatever sequence
/// marker the server attached. Without a marker the key degrades to
/// `(call_id, type)`, which may over-suppress repeats of the same type within
/// the window; that is safe because every suppressed event would only have
/// re-triggered a reconciliation the next distinct event triggers anyway.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub call_id: CallId,
    pub event_type: &'static str,
    pub seq: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Keep at most this many entries.
    pub max_entries: usize,
    /// Entries older than this no longer suppress anything.
    pub max_age: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            max_age: Duration::seconds(300),
        }
    }
}

#[derive(Debug, Default)]
pub struct IdempotencyLedger {
    config: LedgerConfig,
    seen: HashSet<LedgerKey>,
    order: VecDeque<(LedgerKey, DateTime<Utc>)>,
}

impl IdempotencyLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Records the key and reports whether it was fresh. `false` means the
    /// event was already applied within the window and must be dropped.
    pub fn observe(&mut self, key: LedgerKey) -> bool {
        self.observe_at(key, Utc::now())
    }

    pub(crate) fn observe_at(&mut self, key: LedgerKey, now: DateTime<Utc>) -> bool {
        self.expire(now);
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key.clone());
        self.order.push_back((key, now));
        while self.order.len() > self.config.max_entries {
            if let Some((old, _)) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn expire(&mut self, now: DateTime<Utc>) {
        while let Some((key, at)) = self.order.front() {
            if now.signed_duration_since(*at) > self.config.max_age {
                let key = key.clone();
                self.order.pop_front();
                self.seen.remove(&key);
            } else {
                break;
            }
        }
    }
}
