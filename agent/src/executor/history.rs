//! Bounded audit history of executed commands.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use lookout_protocol::types::HistoryEntry;

/// Fixed-capacity FIFO; the oldest entry is evicted on overflow. Reads
/// copy out so callers never hold the lock.
pub struct HistoryRing {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub async fn record(&self, entry: HistoryEntry) {
        let mut entries = self.entries.lock().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The most recent `min(limit, len)` entries in chronological order.
    pub async fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.lock().await;
        let count = limit.min(entries.len());
        entries.iter().skip(entries.len() - count).cloned().collect()
    }
}
