// Unread notification tracking
//
// Pure state machine over the ordered feed. The unread count is positional:
// the number of events in front of the last-seen marker. Timestamps are never
// compared, so clock skew between events cannot produce phantom unread items.

use serde::{Deserialize, Serialize};

use crate::activity::{ActivityEvent, EventId};

/// What `unread_count` reports before the panel was ever opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeforeFirstView {
    /// No badge until the user has opened the panel once
    #[default]
    CountNone,
    /// Everything already in the feed counts as unread
    CountAll,
}

impl BeforeFirstView {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" | "count_none" | "zero" => Some(BeforeFirstView::CountNone),
            "all" | "count_all" => Some(BeforeFirstView::CountAll),
            _ => None,
        }
    }
}

/// Tracks the last event the user has seen in the notification panel
#[derive(Debug, Clone, Default)]
pub struct UnreadTracker {
    last_viewed: Option<EventId>,
    policy: BeforeFirstView,
    panel_open: bool,
}

impl UnreadTracker {
    pub fn new(policy: BeforeFirstView) -> Self {
        Self {
            last_viewed: None,
            policy,
            panel_open: false,
        }
    }

    pub fn last_viewed(&self) -> Option<&EventId> {
        self.last_viewed.as_ref()
    }

    pub fn policy(&self) -> BeforeFirstView {
        self.policy
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }

    /// Move the marker to the newest event
    ///
    /// No-op when the feed is empty or the newest event is already the
    /// marker. Returns whether the marker moved.
    pub fn mark_seen(&mut self, events: &[ActivityEvent]) -> bool {
        let Some(newest) = events.first() else {
            return false;
        };
        if self.last_viewed.as_ref() == Some(&newest.id) {
            return false;
        }
        tracing::debug!(marker = %newest.id, "Notification marker advanced");
        self.last_viewed = Some(newest.id.clone());
        true
    }

    /// Record the notification panel state; opening it marks the feed seen
    ///
    /// Only a closed -> open transition calls `mark_seen`. Returns whether
    /// the marker moved.
    pub fn set_panel_open(&mut self, open: bool, events: &[ActivityEvent]) -> bool {
        let was_open = std::mem::replace(&mut self.panel_open, open);
        if open && !was_open {
            self.mark_seen(events)
        } else {
            false
        }
    }

    /// Number of events newer than the marker
    ///
    /// Marker unset: governed by `BeforeFirstView`. Marker no longer in the
    /// feed (evicted by a refresh or reconnect): every event counts as unread.
    pub fn unread_count(&self, events: &[ActivityEvent]) -> usize {
        match &self.last_viewed {
            None => match self.policy {
                BeforeFirstView::CountNone => 0,
                BeforeFirstView::CountAll => events.len(),
            },
            Some(marker) => events
                .iter()
                .position(|e| &e.id == marker)
                .unwrap_or(events.len()),
        }
    }

    /// The unread events themselves, newest first
    pub fn unread<'a>(&self, events: &'a [ActivityEvent]) -> &'a [ActivityEvent] {
        &events[..self.unread_count(events)]
    }

    /// Whether the marker is set but has dropped out of the feed
    pub fn is_marker_stale(&self, events: &[ActivityEvent]) -> bool {
        match &self.last_viewed {
            Some(marker) => !events.iter().any(|e| &e.id == marker),
            None => false,
        }
    }

    /// Forget the marker (back to the never-opened state)
    pub fn reset(&mut self) {
        self.last_viewed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityType;
    use crate::feed::EventFeed;
    use chrono::Utc;

    fn ev(id: &str) -> ActivityEvent {
        ActivityEvent::new(id, ActivityType::MessageReceived, "New message", Utc::now())
    }

    fn feed_of(ids: &[&str]) -> EventFeed {
        let mut feed = EventFeed::new(100);
        feed.merge(ids.iter().map(|id| ev(id)).collect());
        feed
    }

    #[test]
    fn test_no_badge_before_first_open() {
        let feed = feed_of(&["e1", "e2", "e3"]);
        let tracker = UnreadTracker::default();

        assert_eq!(tracker.unread_count(feed.events()), 0);
        assert!(tracker.unread(feed.events()).is_empty());
    }

    #[test]
    fn test_count_all_policy_before_first_open() {
        let feed = feed_of(&["e1", "e2", "e3"]);
        let tracker = UnreadTracker::new(BeforeFirstView::CountAll);

        assert_eq!(tracker.unread_count(feed.events()), 3);
    }

    #[test]
    fn test_mark_seen_on_empty_feed_is_noop() {
        let mut tracker = UnreadTracker::default();
        assert!(!tracker.mark_seen(&[]));
        assert!(tracker.last_viewed().is_none());
    }

    #[test]
    fn test_unread_resets_after_mark_seen() {
        let mut feed = feed_of(&["e1", "e2"]);
        let mut tracker = UnreadTracker::default();
        tracker.mark_seen(feed.events());
        feed.merge(vec![ev("e3")]);
        assert_eq!(tracker.unread_count(feed.events()), 1);

        tracker.mark_seen(feed.events());
        assert_eq!(tracker.unread_count(feed.events()), 0);
    }

    #[test]
    fn test_unread_accumulates() {
        let mut feed = feed_of(&["e1"]);
        let mut tracker = UnreadTracker::default();
        tracker.mark_seen(feed.events());

        feed.merge(vec![ev("e2"), ev("e3")]);
        let k = tracker.unread_count(feed.events());
        assert_eq!(k, 2);

        feed.merge(vec![ev("e4"), ev("e5"), ev("e6")]);
        assert_eq!(tracker.unread_count(feed.events()), k + 3);

        // Redelivered events are not new
        feed.merge(vec![ev("e6"), ev("e2")]);
        assert_eq!(tracker.unread_count(feed.events()), k + 3);
    }

    #[test]
    fn test_notification_panel_scenario() {
        let mut feed = feed_of(&["e1", "e2", "e3"]);
        let mut tracker = UnreadTracker::default();

        // Open the panel
        assert!(tracker.set_panel_open(true, feed.events()));
        assert_eq!(tracker.last_viewed().unwrap().as_str(), "e1");
        assert_eq!(tracker.unread_count(feed.events()), 0);
        tracker.set_panel_open(false, feed.events());

        // e4 then e5 arrive; each prepends, so e5 ends up newest
        feed.merge(vec![ev("e4")]);
        feed.merge(vec![ev("e5")]);
        assert_eq!(tracker.unread_count(feed.events()), 2);

        // Open again: marker moves to the newest event
        tracker.set_panel_open(true, feed.events());
        assert_eq!(tracker.last_viewed().unwrap().as_str(), "e5");
        assert_eq!(tracker.unread_count(feed.events()), 0);
    }

    #[test]
    fn test_staying_open_does_not_remark() {
        let mut feed = feed_of(&["e1"]);
        let mut tracker = UnreadTracker::default();
        tracker.set_panel_open(true, feed.events());

        feed.merge(vec![ev("e2")]);
        assert!(!tracker.set_panel_open(true, feed.events()));
        assert_eq!(tracker.unread_count(feed.events()), 1);
    }

    #[test]
    fn test_evicted_marker_counts_everything() {
        let mut feed = feed_of(&["e1", "e2", "e3"]);
        let mut tracker = UnreadTracker::default();
        tracker.mark_seen(feed.events());

        // Refresh window no longer contains e1
        feed.replace_head(vec![ev("e7"), ev("e6"), ev("e2")]);

        assert!(tracker.is_marker_stale(feed.events()));
        assert_eq!(tracker.unread_count(feed.events()), feed.len());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(BeforeFirstView::parse("ALL"), Some(BeforeFirstView::CountAll));
        assert_eq!(BeforeFirstView::parse("none"), Some(BeforeFirstView::CountNone));
        assert_eq!(BeforeFirstView::parse("maybe"), None);
    }
}
