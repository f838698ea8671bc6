//! Pending ring offers awaiting accept or decline.

use crate::types::CallId;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One pending ring offer. Queue membership ends on accept, decline, or
/// eviction when the call ends before the user acts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomingInvite {
    pub call_id: CallId,
    pub caller_name: String,
    pub caller_id: String,
    pub room_name: String,
    pub received_at: DateTime<Utc>,
}

/// FIFO queue of invites, insertion order = arrival order. Multiple
/// simultaneous invites are allowed and independently actionable; accepting
/// one deliberately does not auto-decline the others.
#[derive(Debug, Default)]
pub struct InviteQueue {
    invites: Vec<IncomingInvite>,
}

impl InviteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an invite unless one with the same call id is already queued.
    /// Returns whether the invite was added.
    pub fn enqueue(&mut self, invite: IncomingInvite) -> bool {
        if self.contains(&invite.call_id) {
            return false;
        }
        self.invites.push(invite);
        true
    }

    pub fn contains(&self, call_id: &CallId) -> bool {
        self.invites.iter().any(|i| &i.call_id == call_id)
    }

    /// Removes and returns the invite for `call_id`, if queued.
    pub fn remove(&mut self, call_id: &CallId) -> Option<IncomingInvite> {
        let idx = self.invites.iter().position(|i| &i.call_id == call_id)?;
        Some(self.invites.remove(idx))
    }

    /// Stale-invite eviction: drops the invite when the call ended or was
    /// cancelled before the user acted. Returns whether anything was evicted.
    pub fn evict(&mut self, call_id: &CallId) -> bool {
        self.remove(call_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IncomingInvite> {
        self.invites.iter()
    }

    pub fn len(&self) -> usize {
        self.invites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }

    pub fn clear(&mut self) {
        self.invites.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(call_id: &str, caller: &str) -> IncomingInvite {
        IncomingInvite {
            call_id: CallId::from(call_id),
            caller_name: caller.to_string(),
            caller_id: format!("u-{caller}"),
            room_name: format!("room-{call_id}"),
            received_at: Utc::now(),
        }
    }

    /// Arrival order is preserved.
    #[test]
    fn test_fifo_order() {
        let mut queue = InviteQueue::new();
        assert!(queue.enqueue(invite("c1", "alice")));
        assert!(queue.enqueue(invite("c2", "bob")));

        let ids: Vec<_> = queue.iter().map(|i| i.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    /// A re-delivered offer for a queued call id is not added twice.
    #[test]
    fn test_duplicate_call_id_rejected() {
        let mut queue = InviteQueue::new();
        assert!(queue.enqueue(invite("c1", "alice")));
        assert!(!queue.enqueue(invite("c1", "alice")));
        assert_eq!(queue.len(), 1);
    }

    /// Removing one invite leaves the others queued and actionable.
    #[test]
    fn test_remove_leaves_others() {
        let mut queue = InviteQueue::new();
        queue.enqueue(invite("c1", "alice"));
        queue.enqueue(invite("c2", "bob"));

        let removed = queue.remove(&CallId::from("c1")).unwrap();
        assert_eq!(removed.caller_name, "alice");
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(&CallId::from("c2")));
    }

    #[test]
    fn test_evict_unknown_is_noop() {
        let mut queue = InviteQueue::new();
        queue.enqueue(invite("c1", "alice"));
        assert!(!queue.evict(&CallId::from("c9")));
        assert_eq!(queue.len(), 1);
    }
}
