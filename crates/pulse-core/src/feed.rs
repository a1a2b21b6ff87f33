// Ordered event feed
//
// Newest-first list of activity events ordered by arrival, deduplicated by id.
// Once an event is in the feed its position relative to other known events
// never changes; only genuinely new events are inserted, and always at the
// front. The unread tracker counts by position, so this is load-bearing.

use std::collections::HashSet;

use crate::activity::{ActivityEvent, EventId};

/// Result of folding a batch or refresh window into the feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Events inserted at the front
    pub inserted: usize,
    /// Events removed (tail overflow, or dropped out of a refresh window)
    pub evicted: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.evicted > 0
    }
}

/// Bounded, insertion-ordered, id-deduplicated event list
#[derive(Debug, Clone)]
pub struct EventFeed {
    events: Vec<ActivityEvent>,
    ids: HashSet<EventId>,
    capacity: usize,
}

impl EventFeed {
    /// Create an empty feed holding at most `capacity` events (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            ids: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn events(&self) -> &[ActivityEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    /// Newest event, if any
    pub fn newest(&self) -> Option<&ActivityEvent> {
        self.events.first()
    }

    /// Merge a batch delivered newest-first
    ///
    /// Events already in the feed are ignored (not duplicated, not moved).
    /// Remaining events go to the front in the order they were delivered.
    pub fn merge(&mut self, batch: Vec<ActivityEvent>) -> MergeOutcome {
        let fresh = self.take_unknown(batch);
        let inserted = fresh.len();
        if inserted == 0 {
            return MergeOutcome::default();
        }

        let mut merged = fresh;
        merged.append(&mut self.events);
        self.events = merged;

        MergeOutcome {
            inserted,
            evicted: self.enforce_capacity(),
        }
    }

    /// Replace the head region with an authoritative "most recent" window
    ///
    /// Unknown events in `window` go to the front in delivered order. Known
    /// events keep their current relative order. Known events absent from
    /// `window` are no longer among the most recent and are dropped.
    pub fn replace_head(&mut self, window: Vec<ActivityEvent>) -> MergeOutcome {
        let window_ids: HashSet<EventId> = window.iter().map(|e| e.id.clone()).collect();

        let before = self.events.len();
        let ids = &mut self.ids;
        self.events.retain(|e| {
            let keep = window_ids.contains(&e.id);
            if !keep {
                ids.remove(&e.id);
            }
            keep
        });
        let dropped = before - self.events.len();

        let outcome = self.merge(window);
        MergeOutcome {
            inserted: outcome.inserted,
            evicted: outcome.evicted + dropped,
        }
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.events.clear();
        self.ids.clear();
    }

    /// Filter a batch down to events not yet in the feed, collapsing
    /// in-batch duplicates to their first occurrence. Registers the ids.
    fn take_unknown(&mut self, batch: Vec<ActivityEvent>) -> Vec<ActivityEvent> {
        batch
            .into_iter()
            .filter(|event| self.ids.insert(event.id.clone()))
            .collect()
    }

    fn enforce_capacity(&mut self) -> usize {
        if self.events.len() <= self.capacity {
            return 0;
        }
        let overflow = self.events.split_off(self.capacity);
        for event in &overflow {
            self.ids.remove(&event.id);
        }
        overflow.len()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FEED_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityType;
    use chrono::Utc;

    fn ev(id: &str) -> ActivityEvent {
        ActivityEvent::new(id, ActivityType::Login, format!("event {}", id), Utc::now())
    }

    fn ids(feed: &EventFeed) -> Vec<&str> {
        feed.events().iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_merge_into_empty_feed() {
        let mut feed = EventFeed::new(10);
        let outcome = feed.merge(vec![ev("e1"), ev("e2"), ev("e3")]);

        assert_eq!(outcome.inserted, 3);
        assert_eq!(ids(&feed), vec!["e1", "e2", "e3"]);
        assert_eq!(feed.newest().unwrap().id.as_str(), "e1");
    }

    #[test]
    fn test_new_events_go_to_front_in_delivered_order() {
        let mut feed = EventFeed::new(10);
        feed.merge(vec![ev("e1"), ev("e2"), ev("e3")]);
        feed.merge(vec![ev("e5"), ev("e4")]);

        assert_eq!(ids(&feed), vec!["e5", "e4", "e1", "e2", "e3"]);
    }

    #[test]
    fn test_known_events_are_not_moved_or_duplicated() {
        let mut feed = EventFeed::new(10);
        feed.merge(vec![ev("e1"), ev("e2"), ev("e3")]);

        // Redelivery with a new event interleaved between known ones
        let outcome = feed.merge(vec![ev("e3"), ev("e9"), ev("e1")]);

        assert_eq!(outcome.inserted, 1);
        assert_eq!(ids(&feed), vec!["e9", "e1", "e2", "e3"]);
    }

    #[test]
    fn test_in_batch_duplicates_collapse() {
        let mut feed = EventFeed::new(10);
        let outcome = feed.merge(vec![ev("e1"), ev("e1"), ev("e2")]);

        assert_eq!(outcome.inserted, 2);
        assert_eq!(ids(&feed), vec!["e1", "e2"]);
    }

    #[test]
    fn test_relative_order_is_stable_across_merges() {
        let mut feed = EventFeed::new(100);
        feed.merge(vec![ev("a"), ev("b"), ev("c")]);

        for round in 0..5 {
            let batch = vec![ev(&format!("n{}", round)), ev("b"), ev("a")];
            feed.merge(batch);

            let pos = |id: &str| feed.events().iter().position(|e| e.id.as_str() == id);
            assert!(pos("a") < pos("b"));
            assert!(pos("b") < pos("c"));
        }
        assert_eq!(feed.len(), 8);
    }

    #[test]
    fn test_capacity_evicts_from_tail() {
        let mut feed = EventFeed::new(3);
        feed.merge(vec![ev("e1"), ev("e2"), ev("e3")]);
        let outcome = feed.merge(vec![ev("e4")]);

        assert_eq!(outcome.evicted, 1);
        assert_eq!(ids(&feed), vec!["e4", "e1", "e2"]);
        assert!(!feed.contains(&EventId::from("e3")));

        // An evicted id that is delivered again counts as new
        feed.merge(vec![ev("e3")]);
        assert_eq!(ids(&feed), vec!["e3", "e4", "e1"]);
    }

    #[test]
    fn test_replace_head_keeps_known_order() {
        let mut feed = EventFeed::new(10);
        feed.merge(vec![ev("e1"), ev("e2"), ev("e3")]);

        // Server window lists known events in a different order
        let outcome = feed.replace_head(vec![ev("e2"), ev("e1"), ev("e3")]);

        assert!(!outcome.changed());
        assert_eq!(ids(&feed), vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn test_replace_head_inserts_new_and_drops_stale() {
        let mut feed = EventFeed::new(10);
        feed.merge(vec![ev("e1"), ev("e2"), ev("e3")]);

        let outcome = feed.replace_head(vec![ev("e5"), ev("e4"), ev("e1"), ev("e2")]);

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.evicted, 1);
        assert_eq!(ids(&feed), vec!["e5", "e4", "e1", "e2"]);
        assert!(!feed.contains(&EventId::from("e3")));
    }

    #[test]
    fn test_replace_head_with_empty_window_clears() {
        let mut feed = EventFeed::new(10);
        feed.merge(vec![ev("e1"), ev("e2")]);

        let outcome = feed.replace_head(vec![]);

        assert_eq!(outcome.evicted, 2);
        assert!(feed.is_empty());
    }
}
