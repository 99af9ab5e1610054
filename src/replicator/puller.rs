//! The passive pull half of a Replicator: decides which proposed revisions
//! are actually needed, then grafts received bodies onto the local tree
//! (spec.md §4.5).

use super::message::{Message, Profile};
use super::pusher::{ChangeReplyRow, ChangeRow};
use crate::collection::{CollectionStore, IndexDelegate, PutRequest};
use crate::doc::Document;
use crate::error::{LiteCoreError, Result};
use crate::revid::RevId;
use crate::storage::KeyValueStore;

pub struct Puller {
    collection_name: String,
}

impl Puller {
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self { collection_name: collection_name.into() }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Whether `row`'s revision is one we already have (spec.md §4.5
    /// "changes reply compaction uses findDocAncestors").
    pub fn decide_body_needed<S, D>(&self, store: &CollectionStore<S, D>, row: &ChangeRow) -> Result<bool>
    where
        S: KeyValueStore,
        D: IndexDelegate,
    {
        let candidate = RevId::parse_wire(&row.rev_id)?;
        match store.find_doc_ancestors(&row.doc_id, &candidate, 0) {
            Ok(flags) => Ok(super::pusher::Pusher::needs_full_body(flags)),
            Err(LiteCoreError::NotFound) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Builds the `{bodyNeeded}` reply to a peer's `changes` message.
    pub fn build_changes_reply(to: &Message, rows: &[ChangeRow], verdicts: &[bool]) -> Result<Message> {
        let reply_rows: Vec<ChangeReplyRow> =
            verdicts.iter().map(|&body_needed| ChangeReplyRow { body_needed }).collect();
        debug_assert_eq!(rows.len(), reply_rows.len());
        Ok(Message::response(to, serde_json::to_value(reply_rows)?))
    }

    /// Applies one incoming `rev` message's body and new-to-old history
    /// chain onto the local tree (spec.md §4.2 `putExistingRevision`,
    /// driven here by the Puller rather than a local writer).
    pub fn apply_revision<S, D>(
        &self,
        store: &mut CollectionStore<S, D>,
        doc_id: &str,
        body: Option<serde_json::Value>,
        history: Vec<RevId>,
        allow_conflict: bool,
    ) -> Result<(Document, usize)>
    where
        S: KeyValueStore,
        D: IndexDelegate,
    {
        store.put(PutRequest::existing(doc_id, body, history, allow_conflict))
    }

    pub fn profile() -> Profile {
        Profile::Rev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn a_document_not_yet_present_locally_needs_its_body() {
        let store: CollectionStore<MemoryStore> = CollectionStore::new(MemoryStore::new());
        let puller = Puller::new("default");
        let row = ChangeRow { doc_id: "a".into(), rev_id: "1-aa".into(), sequence: 1, body_size: 5, deleted: false };
        assert!(puller.decide_body_needed(&store, &row).unwrap());
    }

    #[test]
    fn applying_a_new_revision_creates_the_document() {
        let mut store: CollectionStore<MemoryStore> = CollectionStore::new(MemoryStore::new());
        let puller = Puller::new("default");
        let (doc, common_ancestor) = puller
            .apply_revision(&mut store, "a", Some(serde_json::json!({"n": 1})), vec![RevId::parse("1-abc").unwrap()], false)
            .unwrap();

        assert_eq!(doc.doc_id, "a");
        assert_eq!(common_ancestor, 0);
        assert_eq!(doc.current_rev_id, RevId::parse("1-abc").unwrap());
    }

    #[test]
    fn an_already_known_revision_does_not_need_resending() {
        let mut store: CollectionStore<MemoryStore> = CollectionStore::new(MemoryStore::new());
        store.put(PutRequest::new_local("a", serde_json::json!({"n": 1}), None)).unwrap();

        let doc = store.get("a", crate::collection::ContentLevel::MetadataOnly).unwrap();
        let puller = Puller::new("default");
        let row = ChangeRow {
            doc_id: "a".into(),
            rev_id: doc.current_rev_id.format(),
            sequence: doc.sequence,
            body_size: 0,
            deleted: false,
        };
        assert!(!puller.decide_body_needed(&store, &row).unwrap());
    }
}
