use crate::doc::DocumentFlags;
use crate::revid::RevId;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// `kMinChangesToKeep` from the original source
/// (`original_source/LiteCore/Database/SequenceTracker.cc`): how many
/// document entries `removeObsoleteEntries` keeps around even with no
/// placeholders holding them back.
pub const DEFAULT_MIN_CHANGES_TO_KEEP: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct SequenceTrackerConfig {
    pub min_changes_to_keep: usize,
}

impl Default for SequenceTrackerConfig {
    fn default() -> Self {
        Self { min_changes_to_keep: DEFAULT_MIN_CHANGES_TO_KEEP }
    }
}

/// Identifies one registered observer's placeholder position in `_changes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

fn next_observer_id() -> ObserverId {
    ObserverId(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
}

/// A document-entry in the tracker's change log (spec.md §3).
#[derive(Debug, Clone)]
pub struct ChangeEntry {
    pub doc_id: String,
    /// `None` for a purge.
    pub rev_id: Option<RevId>,
    /// 0 for a purge — the document's old sequence is abandoned, not reused.
    pub sequence: u64,
    pub body_size: usize,
    pub flags: DocumentFlags,
    pub external: bool,
    pub committed_sequence: u64,
}

#[derive(Debug, Clone)]
enum Entry {
    Document(ChangeEntry),
    Placeholder(ObserverId),
    Transaction,
}

/// A handle to a placeholder position in the change log, returned by
/// [`SequenceTracker::add_placeholder_after`] and consumed by
/// [`SequenceTracker::read_changes`].
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderHandle {
    pub(crate) id: ObserverId,
}

/// Maintains a linear, in-memory log of per-collection changes in commit
/// order (spec.md §4.3). Modeled as a [`VecDeque`] of entries rather than
/// the original's intrusive doubly linked list: this crate's collections
/// hold far fewer live entries than the C++ original's page caches ever
/// did, so a flat deque with occasional linear scans is simpler and just
/// as correct, at the cost of O(n) instead of O(1) per-entry moves.
pub struct SequenceTracker {
    config: SequenceTrackerConfig,
    changes: VecDeque<Entry>,
    idle: HashMap<String, ChangeEntry>,
    doc_observer_counts: HashMap<String, usize>,
    callbacks: HashMap<ObserverId, Box<dyn FnMut() + Send>>,
    last_sequence: u64,
    pre_transaction_last_sequence: u64,
    transaction_open: bool,
    num_placeholders: usize,
}

impl SequenceTracker {
    pub fn new(config: SequenceTrackerConfig) -> Self {
        Self {
            config,
            changes: VecDeque::new(),
            idle: HashMap::new(),
            doc_observer_counts: HashMap::new(),
            callbacks: HashMap::new(),
            last_sequence: 0,
            pre_transaction_last_sequence: 0,
            transaction_open: false,
            num_placeholders: 0,
        }
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Appends a `_transaction` placeholder at the tail and snapshots
    /// `_lastSequence`. Exactly one transaction placeholder may exist at a
    /// time (spec.md §4.3).
    pub fn begin_transaction(&mut self) {
        assert!(!self.transaction_open, "a transaction is already open on this tracker");
        self.pre_transaction_last_sequence = self.last_sequence;
        self.changes.push_back(Entry::Transaction);
        self.transaction_open = true;
    }

    fn transaction_position(&self) -> Option<usize> {
        self.changes.iter().position(|e| matches!(e, Entry::Transaction))
    }

    /// `documentChanged(docID, revID, sequence, size, flags)` (spec.md §4.3).
    pub fn document_changed(&mut self, doc_id: &str, rev_id: RevId, sequence: u64, size: usize, flags: DocumentFlags) {
        assert!(self.transaction_open, "documentChanged requires an open transaction");
        assert!(sequence > self.last_sequence, "sequence must strictly advance");
        self.last_sequence = sequence;
        self.apply_entry(ChangeEntry {
            doc_id: doc_id.to_string(),
            rev_id: Some(rev_id),
            sequence,
            body_size: size,
            flags,
            external: false,
            committed_sequence: sequence,
        });
    }

    /// `documentPurged(docID)`: as [`SequenceTracker::document_changed`]
    /// with sequence=0 — the old sequence is abandoned, not reassigned.
    pub fn document_purged(&mut self, doc_id: &str) {
        assert!(self.transaction_open, "documentPurged requires an open transaction");
        self.apply_entry(ChangeEntry {
            doc_id: doc_id.to_string(),
            rev_id: None,
            sequence: 0,
            body_size: 0,
            flags: DocumentFlags::NONE,
            external: false,
            committed_sequence: 0,
        });
    }

    fn apply_entry(&mut self, entry: ChangeEntry) {
        let doc_id = entry.doc_id.clone();

        if let Some(pos) = self.changes.iter().position(|e| matches!(e, Entry::Document(ce) if ce.doc_id == doc_id)) {
            self.changes.remove(pos);
        }
        self.idle.remove(&doc_id);

        self.changes.push_back(Entry::Document(entry.clone()));

        if self.doc_observer_counts.get(&doc_id).copied().unwrap_or(0) > 0 {
            tracing::trace!(doc_id = %doc_id, sequence = entry.sequence, "per-document observer notified");
        }

        self.notify_placeholders();
        self.remove_obsolete_entries();
    }

    /// Every placeholder currently in the log fires once — a change just
    /// appeared after its position (spec.md §4.3's "every contiguous run of
    /// placeholders... fires once").
    fn notify_placeholders(&mut self) {
        let ids: Vec<ObserverId> =
            self.changes.iter().filter_map(|e| if let Entry::Placeholder(id) = e { Some(*id) } else { None }).collect();
        for id in ids {
            if let Some(cb) = self.callbacks.get_mut(&id) {
                cb();
            }
        }
    }

    /// `endTransaction(commit)` (spec.md §4.3).
    pub fn end_transaction(&mut self, commit: bool) {
        assert!(self.transaction_open, "no open transaction to end");
        let Some(tx_pos) = self.transaction_position() else {
            self.transaction_open = false;
            return;
        };

        if !commit {
            let reverted: Vec<ChangeEntry> = self
                .changes
                .iter()
                .skip(tx_pos + 1)
                .filter_map(|e| if let Entry::Document(ce) = e { Some(ce.clone()) } else { None })
                .collect();
            for ce in reverted {
                self.apply_entry(ChangeEntry {
                    doc_id: ce.doc_id,
                    rev_id: ce.rev_id,
                    sequence: ce.committed_sequence,
                    body_size: ce.body_size,
                    flags: ce.flags,
                    external: ce.external,
                    committed_sequence: ce.committed_sequence,
                });
            }
            self.last_sequence = self.pre_transaction_last_sequence;
        }

        if let Some(pos) = self.transaction_position() {
            self.changes.remove(pos);
        }
        self.transaction_open = false;
        self.remove_obsolete_entries();
    }

    /// Replays another tracker's post-transaction entries into this log,
    /// marking them `external=true` and advancing `_lastSequence`
    /// monotonically (spec.md §4.3 `addExternalTransaction`).
    pub fn add_external_transaction(&mut self, other: &SequenceTracker) {
        let entries: Vec<ChangeEntry> = other
            .changes
            .iter()
            .filter_map(|e| if let Entry::Document(ce) = e { Some(ce.clone()) } else { None })
            .collect();

        for ce in entries {
            if ce.sequence <= self.last_sequence {
                continue;
            }
            self.last_sequence = ce.sequence;
            self.apply_entry(ChangeEntry { external: true, ..ce });
        }
    }

    /// `addPlaceholderAfter(observer, sinceSeq)` (spec.md §4.3): scans
    /// backward from the tail for the leftmost position at which
    /// everything after it has sequence > `since_seq`.
    pub fn add_placeholder_after(&mut self, since_seq: u64) -> PlaceholderHandle {
        let id = next_observer_id();
        let mut insert_at = self.changes.len();
        for (i, entry) in self.changes.iter().enumerate().rev() {
            match entry {
                Entry::Document(ce) if ce.sequence > since_seq => insert_at = i,
                _ => break,
            }
        }
        self.changes.insert(insert_at, Entry::Placeholder(id));
        self.num_placeholders += 1;
        PlaceholderHandle { id }
    }

    pub fn set_placeholder_callback(&mut self, placeholder: &PlaceholderHandle, callback: impl FnMut() + Send + 'static) {
        self.callbacks.insert(placeholder.id, Box::new(callback));
    }

    /// `readChanges(placeholder, buf, max, &external) → n` (spec.md §4.3):
    /// collects up to `max` document entries forward of the placeholder
    /// whose `external` flags all match, splices the placeholder to its
    /// new position, and runs housekeeping.
    pub fn read_changes(&mut self, placeholder: &PlaceholderHandle, max: usize) -> (Vec<ChangeEntry>, bool) {
        let Some(pos) = self.changes.iter().position(|e| matches!(e, Entry::Placeholder(id) if *id == placeholder.id)) else {
            return (Vec::new(), false);
        };

        let mut collected = Vec::new();
        let mut external: Option<bool> = None;
        let mut new_pos = pos;
        let mut i = pos + 1;

        while i < self.changes.len() && collected.len() < max {
            if let Entry::Document(ce) = &self.changes[i] {
                match external {
                    None => external = Some(ce.external),
                    Some(e) if e != ce.external => break,
                    _ => {}
                }
                collected.push(ce.clone());
                new_pos = i;
            }
            i += 1;
        }

        if new_pos != pos {
            self.changes.remove(pos);
            self.changes.insert(new_pos, Entry::Placeholder(placeholder.id));
        }

        self.remove_obsolete_entries();
        (collected, external.unwrap_or(false))
    }

    /// `removeObsoleteEntries()` (spec.md §4.3).
    pub fn remove_obsolete_entries(&mut self) {
        while self.changes.len() > self.config.min_changes_to_keep + self.num_placeholders {
            match self.changes.front() {
                Some(Entry::Document(_)) => {
                    if let Some(Entry::Document(ce)) = self.changes.pop_front() {
                        if self.doc_observer_counts.get(&ce.doc_id).copied().unwrap_or(0) > 0 {
                            self.idle.insert(ce.doc_id.clone(), ce);
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Registers (or increments the subscription count of) a per-document
    /// observer, pulling the document back out of the idle list if it was
    /// there (spec.md §4.3).
    pub fn add_document_observer(&mut self, doc_id: &str) {
        *self.doc_observer_counts.entry(doc_id.to_string()).or_insert(0) += 1;
    }

    /// Cancels a per-document observer subscription (spec.md §4.3
    /// cancellation: "decrements its per-doc subscription count").
    pub fn remove_document_observer(&mut self, doc_id: &str) {
        if let Some(count) = self.doc_observer_counts.get_mut(doc_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.doc_observer_counts.remove(doc_id);
            }
        }
    }

    /// Cancels a database-level observer: removes its placeholder (spec.md
    /// §4.3 cancellation).
    pub fn remove_placeholder(&mut self, placeholder: &PlaceholderHandle) {
        if let Some(pos) = self.changes.iter().position(|e| matches!(e, Entry::Placeholder(id) if *id == placeholder.id)) {
            self.changes.remove(pos);
            self.num_placeholders = self.num_placeholders.saturating_sub(1);
        }
        self.callbacks.remove(&placeholder.id);
    }

    pub fn idle_doc_ids(&self) -> HashSet<String> {
        self.idle.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.changes.iter().filter(|e| matches!(e, Entry::Document(_))).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revid::RevId;

    fn rev(s: &str) -> RevId {
        RevId::parse(s).unwrap()
    }

    fn small_tracker() -> SequenceTracker {
        SequenceTracker::new(SequenceTrackerConfig { min_changes_to_keep: 2 })
    }

    #[test]
    fn document_changed_requires_an_open_transaction() {
        let result = std::panic::catch_unwind(|| {
            let mut t = SequenceTracker::new(SequenceTrackerConfig::default());
            t.document_changed("doc1", rev("1-aa"), 1, 10, DocumentFlags::NONE);
        });
        assert!(result.is_err());
    }

    #[test]
    fn basic_change_advances_last_sequence() {
        let mut t = SequenceTracker::new(SequenceTrackerConfig::default());
        t.begin_transaction();
        t.document_changed("doc1", rev("1-aa"), 1, 10, DocumentFlags::NONE);
        t.end_transaction(true);
        assert_eq!(t.last_sequence(), 1);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn abort_reverts_changes_made_during_the_transaction() {
        let mut t = SequenceTracker::new(SequenceTrackerConfig::default());
        t.begin_transaction();
        t.document_changed("doc1", rev("1-aa"), 1, 10, DocumentFlags::NONE);
        t.end_transaction(false);
        assert_eq!(t.last_sequence(), 0);
    }

    #[test]
    fn placeholder_collects_only_changes_after_it() {
        let mut t = SequenceTracker::new(SequenceTrackerConfig::default());
        t.begin_transaction();
        t.document_changed("doc1", rev("1-aa"), 1, 10, DocumentFlags::NONE);
        t.end_transaction(true);

        let ph = t.add_placeholder_after(1);

        t.begin_transaction();
        t.document_changed("doc2", rev("1-bb"), 2, 10, DocumentFlags::NONE);
        t.end_transaction(true);

        let (changes, external) = t.read_changes(&ph, 10);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].doc_id, "doc2");
        assert!(!external);
    }

    #[test]
    fn remove_obsolete_entries_keeps_at_least_min_changes_to_keep() {
        let mut t = small_tracker();
        for i in 1..=5u64 {
            t.begin_transaction();
            t.document_changed(&format!("doc{i}"), rev("1-aa"), i, 1, DocumentFlags::NONE);
            t.end_transaction(true);
        }
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn purge_does_not_advance_last_sequence() {
        let mut t = SequenceTracker::new(SequenceTrackerConfig::default());
        t.begin_transaction();
        t.document_changed("doc1", rev("1-aa"), 1, 10, DocumentFlags::NONE);
        t.end_transaction(true);

        t.begin_transaction();
        t.document_purged("doc1");
        t.end_transaction(true);

        assert_eq!(t.last_sequence(), 1);
    }

    #[test]
    fn add_external_transaction_replays_as_external() {
        let mut source = SequenceTracker::new(SequenceTrackerConfig::default());
        source.begin_transaction();
        source.document_changed("doc1", rev("1-aa"), 1, 10, DocumentFlags::NONE);
        source.end_transaction(true);

        let mut dest = SequenceTracker::new(SequenceTrackerConfig::default());
        dest.add_external_transaction(&source);

        assert_eq!(dest.last_sequence(), 1);
        let ph = dest.add_placeholder_after(0);
        let (changes, external) = dest.read_changes(&ph, 10);
        assert_eq!(changes.len(), 1);
        assert!(external);
    }
}
