use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Per-user live session refcounts. A user is online while at least one
/// gateway session holds a count for them; status transitions fire only
/// on the 0→1 and 1→0 edges, never on concurrent extra sessions.
pub struct PresenceTracker {
    counts: DashMap<i64, usize>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
        }
    }

    /// Record a session for the user. Returns true when this is the
    /// user's first live session (the offline→online edge).
    pub fn connect(&self, user_id: i64) -> bool {
        match self.counts.entry(user_id) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() += 1;
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(1);
                true
            }
        }
    }

    /// Drop a session for the user. Returns true when it was their last
    /// live session (the online→offline edge). A disconnect without a
    /// matching connect is a no-op.
    pub fn disconnect(&self, user_id: i64) -> bool {
        match self.counts.entry(user_id) {
            Entry::Occupied(mut entry) => {
                if *entry.get() <= 1 {
                    entry.remove();
                    true
                } else {
                    *entry.get_mut() -= 1;
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.counts.contains_key(&user_id)
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_connect_and_last_disconnect_are_the_only_edges() {
        let tracker = PresenceTracker::new();
        assert!(tracker.connect(1));
        assert!(!tracker.connect(1));
        assert!(tracker.is_online(1));

        assert!(!tracker.disconnect(1));
        assert!(tracker.is_online(1));
        assert!(tracker.disconnect(1));
        assert!(!tracker.is_online(1));
    }

    #[test]
    fn disconnect_without_connect_is_a_noop() {
        let tracker = PresenceTracker::new();
        assert!(!tracker.disconnect(7));
        assert!(!tracker.is_online(7));
    }

    #[test]
    fn users_are_tracked_independently() {
        let tracker = PresenceTracker::new();
        tracker.connect(1);
        tracker.connect(2);
        assert!(tracker.disconnect(1));
        assert!(tracker.is_online(2));
    }
}
