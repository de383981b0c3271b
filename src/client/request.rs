use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
struct TrackerState {
    generation: AtomicU64,
    in_flight: AtomicBool,
    active: AtomicBool,
}

/// RequestTracker
///
/// Per-view bookkeeping for async requests. Each request gets a ticket; a ticket's
/// result is only delivered if the view is still active and no newer request started.
/// Submissions use `try_begin`, which refuses while another submission is in flight.
#[derive(Debug, Clone)]
pub struct RequestTracker {
    state: Arc<TrackerState>,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(TrackerState {
                generation: AtomicU64::new(0),
                in_flight: AtomicBool::new(false),
                active: AtomicBool::new(true),
            }),
        }
    }

    fn issue(&self, holds_flight: bool) -> RequestTicket {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket {
            state: self.state.clone(),
            generation,
            holds_flight,
        }
    }

    /// Starts a load. Any earlier ticket becomes stale.
    pub fn begin(&self) -> RequestTicket {
        self.issue(false)
    }

    /// Starts a submission, or returns `None` while one is already in flight.
    pub fn try_begin(&self) -> Option<RequestTicket> {
        self.state
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(self.issue(true))
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// The view went away; every outstanding result is dropped.
    pub fn deactivate(&self) {
        self.state.active.store(false, Ordering::SeqCst);
    }
}

/// RequestTicket
///
/// Proof of one started request. Dropping a submission ticket releases the in-flight flag.
#[derive(Debug)]
pub struct RequestTicket {
    state: Arc<TrackerState>,
    generation: u64,
    holds_flight: bool,
}

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
            && self.state.generation.load(Ordering::SeqCst) == self.generation
    }

    /// Hands back `value` if it may still be applied to the view.
    pub fn finish<T>(self, value: T) -> Option<T> {
        self.is_current().then_some(value)
    }
}

impl Drop for RequestTicket {
    fn drop(&mut self) {
        if self.holds_flight {
            self.state.in_flight.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_request_supersedes_older() {
        let tracker = RequestTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();
        assert!(second.generation() > first.generation());
        assert_eq!(first.finish("stale"), None);
        assert_eq!(second.finish("fresh"), Some("fresh"));
    }

    #[test]
    fn submissions_are_exclusive_until_finished() {
        let tracker = RequestTracker::new();
        let ticket = tracker.try_begin().unwrap();
        assert!(tracker.is_in_flight());
        assert!(tracker.try_begin().is_none());

        assert_eq!(ticket.finish(1), Some(1));
        assert!(!tracker.is_in_flight());
        assert!(tracker.try_begin().is_some());
    }

    #[test]
    fn deactivated_view_drops_results() {
        let tracker = RequestTracker::new();
        let ticket = tracker.begin();
        tracker.deactivate();
        assert_eq!(ticket.finish(vec![1, 2, 3]), None);
    }
}
