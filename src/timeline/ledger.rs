//! Read-state ledger and the pending write-back queue.
//!
//! Invariants maintained here:
//! - every id in the pending queue is also in the read set
//! - the queue holds each id at most once, in first-enqueued order

use std::collections::HashSet;

/// What `mark_unread` found before removing the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnreadOutcome {
    pub was_read: bool,
    pub was_pending: bool,
}

#[derive(Debug, Default, Clone)]
pub struct ReadLedger {
    read: HashSet<String>,
    pending: Vec<String>,
    /// Ids marked unread since the current reload started. A reload must not
    /// resurrect them from a persisted or server snapshot taken before.
    unread_since_reload: HashSet<String>,
}

impl ReadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read.contains(id)
    }

    pub fn read_ids(&self) -> &HashSet<String> {
        &self.read
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.iter().any(|p| p == id)
    }

    /// Add to the read set. Returns true if the id was not read before.
    pub fn insert(&mut self, id: &str) -> bool {
        self.unread_since_reload.remove(id);
        self.read.insert(id.to_string())
    }

    /// Add to the read set and queue for write-back.
    pub fn enqueue(&mut self, id: &str) {
        self.insert(id);
        if !self.is_pending(id) {
            self.pending.push(id.to_string());
        }
    }

    pub fn remove(&mut self, id: &str) -> UnreadOutcome {
        let was_pending = self.is_pending(id);
        self.pending.retain(|p| p != id);
        let was_read = self.read.remove(id);
        self.unread_since_reload.insert(id.to_string());
        UnreadOutcome {
            was_read,
            was_pending,
        }
    }

    /// Drain the queue for a flush. The ids stay in the read set.
    pub fn take_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    /// Put back ids from a failed flush. Ids marked unread in the meantime
    /// are dropped. Returns the number of ids re-queued.
    pub fn requeue(&mut self, ids: Vec<String>) -> usize {
        let mut count = 0;
        for id in ids {
            if self.read.contains(&id) && !self.is_pending(&id) {
                self.pending.push(id);
                count += 1;
            }
        }
        count
    }

    /// Apply a confirmed bulk mark-read: everything becomes read and leaves
    /// the queue.
    pub fn apply_bulk<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        let ids: HashSet<&str> = ids.into_iter().collect();
        for id in &ids {
            self.insert(id);
        }
        self.pending.retain(|p| !ids.contains(p.as_str()));
    }

    /// Called when a primary load starts.
    pub fn begin_reload(&mut self) {
        self.unread_since_reload.clear();
    }

    /// Merge the snapshots a reload observed:
    /// `(current ∪ persisted ∪ server_read) − unread_since_reload`.
    pub fn merge_reload(
        &mut self,
        persisted: impl IntoIterator<Item = String>,
        server_read: impl IntoIterator<Item = String>,
    ) {
        for id in persisted.into_iter().chain(server_read) {
            if !self.unread_since_reload.contains(&id) {
                self.read.insert(id);
            }
        }
        let dropped = &self.unread_since_reload;
        self.read.retain(|id| !dropped.contains(id));
        let read = &self.read;
        self.pending.retain(|id| read.contains(id));
        self.unread_since_reload.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_enqueue_dedupes_and_marks_read() {
        let mut ledger = ReadLedger::new();
        ledger.enqueue("a");
        ledger.enqueue("b");
        ledger.enqueue("a");
        assert_eq!(ledger.pending(), &ids(&["a", "b"])[..]);
        assert!(ledger.contains("a"));
    }

    #[test]
    fn test_remove_reports_pending() {
        let mut ledger = ReadLedger::new();
        ledger.enqueue("a");
        ledger.insert("b");
        assert_eq!(
            ledger.remove("a"),
            UnreadOutcome {
                was_read: true,
                was_pending: true
            }
        );
        assert_eq!(
            ledger.remove("b"),
            UnreadOutcome {
                was_read: true,
                was_pending: false
            }
        );
        assert!(!ledger.has_pending());
    }

    #[test]
    fn test_requeue_skips_unread_ids() {
        let mut ledger = ReadLedger::new();
        ledger.enqueue("a");
        ledger.enqueue("b");
        let batch = ledger.take_pending();
        assert!(!ledger.has_pending());
        ledger.remove("b");
        assert_eq!(ledger.requeue(batch), 1);
        assert_eq!(ledger.pending(), &ids(&["a"])[..]);
    }

    #[test]
    fn test_requeue_keeps_newer_entries() {
        let mut ledger = ReadLedger::new();
        ledger.enqueue("a");
        let batch = ledger.take_pending();
        ledger.enqueue("c");
        ledger.requeue(batch);
        assert_eq!(ledger.pending(), &ids(&["c", "a"])[..]);
    }

    #[test]
    fn test_merge_reload_unions_snapshots() {
        let mut ledger = ReadLedger::new();
        ledger.insert("local");
        ledger.begin_reload();
        ledger.merge_reload(ids(&["persisted"]), ids(&["server"]));
        for id in ["local", "persisted", "server"] {
            assert!(ledger.contains(id), "{} should be read", id);
        }
    }

    #[test]
    fn test_merge_reload_respects_unread_during_load() {
        let mut ledger = ReadLedger::new();
        ledger.enqueue("a");
        ledger.begin_reload();
        ledger.remove("a");
        ledger.merge_reload(ids(&["a"]), ids(&["a"]));
        assert!(!ledger.contains("a"));
        assert!(!ledger.is_pending("a"));
    }

    #[test]
    fn test_mark_read_after_unread_clears_tombstone() {
        let mut ledger = ReadLedger::new();
        ledger.begin_reload();
        ledger.remove("a");
        ledger.insert("a");
        ledger.merge_reload(Vec::new(), Vec::new());
        assert!(ledger.contains("a"));
    }

    #[test]
    fn test_apply_bulk_clears_queue_entries() {
        let mut ledger = ReadLedger::new();
        ledger.enqueue("a");
        ledger.enqueue("z");
        ledger.apply_bulk(["a", "b"]);
        assert!(ledger.contains("b"));
        assert_eq!(ledger.pending(), &ids(&["z"])[..]);
    }
}
