// Copyright (c) 2025 - Cowboy AI, LLC.

//! Fixed-size dedup window over recently processed envelope IDs
//! (section 4.4.4 step 4). A ring buffer plus a set gives O(1)
//! membership tests without unbounded growth.

use std::collections::HashSet;
use std::collections::VecDeque;
use uuid::Uuid;

pub const DEFAULT_DEDUP_WINDOW: usize = 1024;

pub struct DedupWindow {
    capacity: usize,
    order: VecDeque<Uuid>,
    seen: HashSet<Uuid>,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    pub fn contains(&self, envelope_id: Uuid) -> bool {
        self.seen.contains(&envelope_id)
    }

    /// Record an ID, evicting the oldest entry if the window is full.
    pub fn record(&mut self, envelope_id: Uuid) {
        if self.seen.contains(&envelope_id) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.order.push_back(envelope_id);
        self.seen.insert(envelope_id);
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_detects_duplicates() {
        let mut window = DedupWindow::new(4);
        let id = Uuid::now_v7();
        assert!(!window.contains(id));
        window.record(id);
        assert!(window.contains(id));
    }

    #[test]
    fn evicts_oldest_once_capacity_exceeded() {
        let mut window = DedupWindow::new(2);
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let c = Uuid::now_v7();
        window.record(a);
        window.record(b);
        window.record(c);
        assert!(!window.contains(a));
        assert!(window.contains(b));
        assert!(window.contains(c));
    }
}
