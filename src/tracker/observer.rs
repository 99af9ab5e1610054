use super::sequence_tracker::{PlaceholderHandle, SequenceTracker};

/// A database-level change observer: a live placeholder walking the
/// change log (spec.md §4.3). Cancellation removes the placeholder;
/// callers must call [`DatabaseObserver::cancel`] explicitly with the
/// owning tracker rather than relying on `Drop`, since the tracker
/// normally lives behind a single actor task (see `support::actor`) that
/// the observer handle doesn't itself have access to.
pub struct DatabaseObserver {
    placeholder: PlaceholderHandle,
}

impl DatabaseObserver {
    pub fn register(tracker: &mut SequenceTracker, since_seq: u64) -> Self {
        Self { placeholder: tracker.add_placeholder_after(since_seq) }
    }

    pub fn placeholder(&self) -> &PlaceholderHandle {
        &self.placeholder
    }

    pub fn on_change(&self, tracker: &mut SequenceTracker, callback: impl FnMut() + Send + 'static) {
        tracker.set_placeholder_callback(&self.placeholder, callback);
    }

    /// Removes this observer's placeholder. No in-flight callback is
    /// interrupted (spec.md §4.3 cancellation).
    pub fn cancel(self, tracker: &mut SequenceTracker) {
        tracker.remove_placeholder(&self.placeholder);
    }
}

/// A per-document change observer: increments the document's subscription
/// count so it's exempted from idle eviction (spec.md §4.3).
pub struct DocumentObserver {
    doc_id: String,
}

impl DocumentObserver {
    pub fn register(tracker: &mut SequenceTracker, doc_id: impl Into<String>) -> Self {
        let doc_id = doc_id.into();
        tracker.add_document_observer(&doc_id);
        Self { doc_id }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn cancel(self, tracker: &mut SequenceTracker) {
        tracker.remove_document_observer(&self.doc_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::DocumentFlags;
    use crate::revid::RevId;
    use crate::tracker::SequenceTrackerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn database_observer_fires_on_change_and_cancels_cleanly() {
        let mut tracker = SequenceTracker::new(SequenceTrackerConfig::default());
        let observer = DatabaseObserver::register(&mut tracker, 0);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        observer.on_change(&mut tracker, move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        tracker.begin_transaction();
        tracker.document_changed("doc1", RevId::parse("1-aa").unwrap(), 1, 10, DocumentFlags::NONE);
        tracker.end_transaction(true);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        observer.cancel(&mut tracker);
    }

    #[test]
    fn document_observer_exempts_its_doc_from_idle_eviction() {
        let mut tracker = SequenceTracker::new(SequenceTrackerConfig { min_changes_to_keep: 0 });
        let observer = DocumentObserver::register(&mut tracker, "doc1");

        tracker.begin_transaction();
        tracker.document_changed("doc1", RevId::parse("1-aa").unwrap(), 1, 10, DocumentFlags::NONE);
        tracker.end_transaction(true);
        tracker.begin_transaction();
        tracker.document_changed("doc2", RevId::parse("1-bb").unwrap(), 2, 10, DocumentFlags::NONE);
        tracker.end_transaction(true);

        assert!(tracker.idle_doc_ids().contains("doc1"));
        observer.cancel(&mut tracker);
    }
}
