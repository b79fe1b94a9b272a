use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Coalescing window for drag-triggered refits: one recomputation per
/// affected parent chain per window, not one per pointer-move event.
pub const DRAG_REFIT_WINDOW: Duration = Duration::from_millis(120);

/// Batches refit requests raised during continuous drag. Callers mark the
/// affected parent on every move event and periodically drain the batch;
/// marks within the window collapse into a single refit per parent.
///
/// Time is injected, never read from a clock here, so the batcher stays
/// deterministic under test and inert between calls.
#[derive(Debug)]
pub struct RefitBatcher {
    window: Duration,
    pending: BTreeMap<String, Instant>,
}

impl RefitBatcher {
    pub fn new() -> Self {
        Self::with_window(DRAG_REFIT_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
        }
    }

    /// Record that `parent_id`'s chain needs a refit. Repeat marks keep the
    /// earliest timestamp so a node dragged continuously still refits once
    /// per window instead of being pushed out forever.
    pub fn mark(&mut self, parent_id: &str, now: Instant) {
        self.pending.entry(parent_id.to_string()).or_insert(now);
    }

    /// Drain the parents whose window has elapsed.
    pub fn due(&mut self, now: Instant) -> Vec<String> {
        let window = self.window;
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, first)| now.duration_since(**first) >= window)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &due {
            self.pending.remove(id);
        }
        due
    }

    /// Drain everything regardless of age (drag ended, view torn down).
    pub fn flush(&mut self) -> Vec<String> {
        let ids: Vec<String> = self.pending.keys().cloned().collect();
        self.pending.clear();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for RefitBatcher {
    fn default() -> Self {
        Self::new()
    }
}
