//! The active push half of a Replicator: walks the Checkpointer's pending
//! set, proposes revisions to the peer, and compacts against whatever
//! ancestors the peer already has (spec.md §4.5).

use super::message::{Message, Profile};
use crate::checkpoint::Checkpointer;
use crate::collection::{AncestorFlags, CollectionStore, ContentLevel, IndexDelegate};
use crate::doc::{Document, DocumentFlags};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One row of a `changes` message: a revision the Pusher proposes to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRow {
    pub doc_id: String,
    pub rev_id: String,
    pub sequence: u64,
    pub body_size: usize,
    pub deleted: bool,
}

/// The peer's verdict on one proposed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReplyRow {
    pub body_needed: bool,
}

pub struct Pusher {
    collection_name: String,
}

impl Pusher {
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self { collection_name: collection_name.into() }
    }

    /// Gathers everything the Checkpointer considers pending and turns it
    /// into `changes` rows (spec.md §4.5 "Pending-document tracking").
    pub fn pending_changes<S, D>(
        &self,
        store: &CollectionStore<S, D>,
        checkpointer: &Checkpointer,
        configured_collections: &[String],
    ) -> Result<Vec<ChangeRow>>
    where
        S: crate::storage::KeyValueStore,
        D: IndexDelegate,
    {
        let mut rows = Vec::new();
        checkpointer.pending_document_ids(
            store,
            &self.collection_name,
            configured_collections,
            None::<fn(&Document) -> bool>,
            |doc_id| {
                if let Ok(doc) = store.get(doc_id, ContentLevel::CurrentRevBody) {
                    rows.push(ChangeRow {
                        doc_id: doc.doc_id.clone(),
                        rev_id: doc.current_rev_id.format(),
                        sequence: doc.sequence,
                        body_size: doc.body.as_ref().map(|b| b.to_string().len()).unwrap_or(0),
                        deleted: doc.flags.contains(DocumentFlags::DELETED),
                    });
                }
            },
        )?;
        Ok(rows)
    }

    pub fn build_changes_message(number: u64, rows: &[ChangeRow]) -> Result<Message> {
        Ok(Message::request(number, Profile::Changes, serde_json::to_value(rows)?))
    }

    /// Whether a row needs to be sent in full given the peer's
    /// `findDocAncestors`-derived flags, rather than skipped as already
    /// known (spec.md §4.5 "changes reply compaction").
    pub fn needs_full_body(flags: AncestorFlags) -> bool {
        !flags.contains(AncestorFlags::SAME) && !flags.contains(AncestorFlags::REV_EXISTS_AT_REMOTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::PutRequest;
    use crate::storage::MemoryStore;

    fn store_with_one_doc() -> CollectionStore<MemoryStore> {
        let mut store = CollectionStore::new(MemoryStore::new());
        store.put(PutRequest::new_local("a", serde_json::json!({"n": 1}), None)).unwrap();
        store
    }

    #[test]
    fn pending_changes_reports_an_unpushed_document() {
        let store = store_with_one_doc();
        let checkpointer =
            Checkpointer::open(&store, &uuid::Uuid::nil(), crate::checkpoint::CheckpointScope::default()).unwrap();
        let pusher = Pusher::new("default");
        let rows = pusher.pending_changes(&store, &checkpointer, &["default".to_string()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].doc_id, "a");
    }

    #[test]
    fn build_changes_message_carries_every_row() {
        let rows = vec![ChangeRow {
            doc_id: "a".into(),
            rev_id: "1-aa".into(),
            sequence: 1,
            body_size: 10,
            deleted: false,
        }];
        let msg = Pusher::build_changes_message(1, &rows).unwrap();
        assert_eq!(msg.profile, Profile::Changes);
        assert_eq!(msg.properties.as_array().unwrap().len(), 1);
    }

    #[test]
    fn a_row_the_peer_already_has_does_not_need_its_full_body() {
        assert!(!Pusher::needs_full_body(AncestorFlags::SAME));
        assert!(!Pusher::needs_full_body(AncestorFlags::REV_EXISTS_AT_REMOTE));
        assert!(Pusher::needs_full_body(AncestorFlags::NONE));
    }
}
