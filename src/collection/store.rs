use super::content::{AncestorFlags, ContentLevel, PutRequest};
use crate::doc::{validate_doc_id, Document, DocumentFlags, RemoteId, Revision, RevisionFlags, RevisionTree};
use crate::error::{LiteCoreError, Result};
use crate::revid::RevId;
use crate::storage::{EnumerationOrder, KeyValueStore, Keyspace, StoredValue};
use crate::tracker::{SequenceTracker, SequenceTrackerConfig};
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap};

/// Derives a revision digest deterministically from its content, the way
/// the original storage engine hashes a canonical encoding of the body
/// plus parent generation and deleted-ness
/// (`original_source/LiteCore/RevTrees/RevTree.cc`'s `digest()`).
fn revision_digest(doc_id: &str, generation: u64, body: &Option<serde_json::Value>, deleted: bool) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(doc_id.as_bytes());
    hasher.update(generation.to_be_bytes());
    hasher.update([deleted as u8]);
    if let Some(b) = body {
        hasher.update(b.to_string().as_bytes());
    }
    hasher.finalize()[..8].to_vec()
}

/// Delegate for index management, kept out of the Collection Store proper
/// because indexing is a query-engine concern the storage engine owns
/// (spec.md §4.2: "createIndex/deleteIndex/getIndexRows: delegated to the
/// storage engine; spec treats indexes as opaque").
///
/// Shaped after the teacher's `domain::ports::GeoResolver`/`MetricsStore`
/// traits: a narrow seam with a harmless default implementation so the
/// core type compiles and is testable without a concrete query engine.
pub trait IndexDelegate: Send {
    fn create_index(&mut self, _name: &str, _expression: &str) -> Result<()> {
        Ok(())
    }

    fn delete_index(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn get_index_rows(&self, _name: &str) -> Result<Vec<serde_json::Value>> {
        Ok(Vec::new())
    }
}

/// No-op [`IndexDelegate`] used whenever a caller doesn't need a query
/// engine wired in.
#[derive(Debug, Default)]
pub struct NullIndexDelegate;

impl IndexDelegate for NullIndexDelegate {}

/// Transactional per-collection document store (spec.md §4.2). Generic
/// over the backing [`KeyValueStore`] and an [`IndexDelegate`], mirroring
/// the teacher's pattern of a concrete service type generic over a
/// repository trait (`ProxyService<R: BackendRepository>`-style
/// composition, here applied to storage instead of backend routing).
pub struct CollectionStore<S: KeyValueStore, D: IndexDelegate = NullIndexDelegate> {
    backend: S,
    tracker: SequenceTracker,
    documents: HashMap<String, (Document, RevisionTree)>,
    /// Expiration timestamps (ms since epoch) ordered for `nextDocExpiration`.
    expirations: BTreeMap<(i64, String), ()>,
    doc_expires_at: HashMap<String, i64>,
    next_sequence: u64,
    index_delegate: D,
}

impl<S: KeyValueStore> CollectionStore<S, NullIndexDelegate> {
    pub fn new(backend: S) -> Self {
        Self::with_index_delegate(backend, NullIndexDelegate)
    }
}

impl<S: KeyValueStore, D: IndexDelegate> CollectionStore<S, D> {
    pub fn with_index_delegate(backend: S, index_delegate: D) -> Self {
        Self {
            backend,
            tracker: SequenceTracker::new(SequenceTrackerConfig::default()),
            documents: HashMap::new(),
            expirations: BTreeMap::new(),
            doc_expires_at: HashMap::new(),
            next_sequence: 1,
            index_delegate,
        }
    }

    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut SequenceTracker {
        &mut self.tracker
    }

    fn take_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    /// `get(docID, contentLevel)` (spec.md §4.2).
    pub fn get(&self, doc_id: &str, level: ContentLevel) -> Result<Document> {
        let (doc, tree) = self.documents.get(doc_id).ok_or(LiteCoreError::NotFound)?;
        let mut out = doc.clone();
        match level {
            ContentLevel::MetadataOnly => out.body = None,
            ContentLevel::CurrentRevBody => {
                out.body = tree.get(&doc.current_rev_id).and_then(|r| r.body.clone());
            }
            ContentLevel::AllRevsAndBodies => {
                out.body = tree.get(&doc.current_rev_id).and_then(|r| r.body.clone());
            }
        }
        Ok(out)
    }

    /// All revisions of a document, bodies included, for callers that asked
    /// for [`ContentLevel::AllRevsAndBodies`].
    pub fn get_all_revisions(&self, doc_id: &str) -> Result<Vec<Revision>> {
        let (_, tree) = self.documents.get(doc_id).ok_or(LiteCoreError::NotFound)?;
        Ok(tree.nodes().to_vec())
    }

    fn persist_document(&mut self, doc_id: &str) -> Result<()> {
        let (doc, _) = &self.documents[doc_id];
        let bytes = serde_json::to_vec(&doc.body).map_err(LiteCoreError::from)?;
        self.backend.put(Keyspace::Documents, doc_id.as_bytes(), StoredValue { value: bytes, meta: vec![] })
    }

    /// `put(request) → (Document, commonAncestorIndex)` (spec.md §4.2).
    pub fn put(&mut self, request: PutRequest) -> Result<(Document, usize)> {
        validate_doc_id(&request.doc_id)?;

        self.backend.begin_tx()?;
        self.tracker.begin_transaction();

        let result = if request.existing_revision {
            self.put_existing_revision(&request)
        } else {
            self.put_new_revision(&request)
        };

        match result {
            Ok(ok) => {
                self.backend.commit_tx()?;
                self.tracker.end_transaction(true);
                Ok(ok)
            }
            Err(e) => {
                let _ = self.backend.abort_tx();
                self.tracker.end_transaction(false);
                Err(e)
            }
        }
    }

    fn put_new_revision(&mut self, request: &PutRequest) -> Result<(Document, usize)> {
        let entry = self.documents.get(&request.doc_id);

        match entry {
            None => {
                if request.parent.is_some() {
                    return Err(LiteCoreError::Conflict);
                }
            }
            Some((doc, _)) => {
                let current = doc.current_rev_id.clone();
                let matches_current = request.parent.as_ref() == Some(&current);
                if !matches_current && !request.allow_conflict {
                    return Err(LiteCoreError::Conflict);
                }
            }
        }

        let generation = match &request.parent {
            Some(RevId::Tree(t)) => t.generation + 1,
            Some(RevId::Version(_)) => {
                return Err(LiteCoreError::Unsupported("version-form local writes are not generated by this store".into()))
            }
            None => 1,
        };
        let digest = revision_digest(&request.doc_id, generation, &request.body, request.deleted);
        let new_rev_id = RevId::Tree(crate::revid::TreeRevId::new(generation, digest)?);

        let mut flags = RevisionFlags::NONE;
        if request.deleted {
            flags.set(RevisionFlags::DELETED);
        }

        let (doc, tree) = self
            .documents
            .entry(request.doc_id.clone())
            .or_insert_with(|| (Document::new(request.doc_id.clone(), new_rev_id.clone(), None, DocumentFlags::NONE), RevisionTree::new()));

        tree.insert_new(new_rev_id.clone(), request.parent.clone(), request.body.clone(), flags)?;

        let sequence = self.take_sequence();
        let winner = tree.current_leaf().expect("just inserted a leaf").clone();
        doc.current_rev_id = winner.rev_id.clone();
        doc.body = winner.body.clone();
        doc.sequence = sequence;
        doc.flags.set(DocumentFlags::EXISTS);
        if winner.is_deleted() {
            doc.flags.set(DocumentFlags::DELETED);
        } else {
            doc.flags.clear(DocumentFlags::DELETED);
        }
        if tree.open_leaves().count() > 1 {
            doc.flags.set(DocumentFlags::CONFLICTED);
        } else {
            doc.flags.clear(DocumentFlags::CONFLICTED);
        }

        let size = doc.body.as_ref().map(|b| serde_json::to_vec(b).map(|v| v.len()).unwrap_or(0)).unwrap_or(0);
        self.tracker.document_changed(&request.doc_id, doc.current_rev_id.clone(), sequence, size, doc.flags);

        let result_doc = doc.clone();
        self.persist_document(&request.doc_id)?;
        Ok((result_doc, 0))
    }

    fn put_existing_revision(&mut self, request: &PutRequest) -> Result<(Document, usize)> {
        if request.history.is_empty() {
            return Err(LiteCoreError::InvalidParameter("existingRevision put requires a history chain".into()));
        }

        let previous_current = self.documents.get(&request.doc_id).map(|(d, _)| d.current_rev_id.clone());

        let (doc, tree) = self
            .documents
            .entry(request.doc_id.clone())
            .or_insert_with(|| (Document::new(request.doc_id.clone(), request.history[0].clone(), None, DocumentFlags::NONE), RevisionTree::new()));

        let mut chain_nodes = Vec::with_capacity(request.history.len());
        for (i, rev_id) in request.history.iter().enumerate() {
            let body = if i == 0 { request.body.clone() } else { None };
            chain_nodes.push((rev_id.clone(), body, RevisionFlags::NONE));
        }

        let common_ancestor_index = request
            .history
            .iter()
            .position(|r| tree.contains(r))
            .unwrap_or(0);

        let new_leaf = tree.graft_existing_chain(&chain_nodes)?;

        if let Some(previous) = previous_current {
            if !request.allow_conflict && crate::doc::conflicts_with_current(tree, &new_leaf, &previous) {
                return Err(LiteCoreError::Conflict);
            }
        }

        let sequence = self.take_sequence();
        let winner = tree.current_leaf().expect("graft inserted at least a leaf").clone();
        doc.current_rev_id = winner.rev_id.clone();
        doc.body = winner.body.clone();
        doc.sequence = sequence;
        doc.flags.set(DocumentFlags::EXISTS);
        if winner.is_deleted() {
            doc.flags.set(DocumentFlags::DELETED);
        } else {
            doc.flags.clear(DocumentFlags::DELETED);
        }
        if tree.open_leaves().count() > 1 {
            doc.flags.set(DocumentFlags::CONFLICTED);
        } else {
            doc.flags.clear(DocumentFlags::CONFLICTED);
        }

        let size = doc.body.as_ref().map(|b| serde_json::to_vec(b).map(|v| v.len()).unwrap_or(0)).unwrap_or(0);
        self.tracker.document_changed(&request.doc_id, doc.current_rev_id.clone(), sequence, size, doc.flags);

        let result_doc = doc.clone();
        self.persist_document(&request.doc_id)?;
        Ok((result_doc, common_ancestor_index))
    }

    /// `purge(docID)` (spec.md §4.2). Emits a purge change event
    /// (sequence=0) into the Sequence Tracker before releasing the
    /// transaction.
    pub fn purge(&mut self, doc_id: &str) -> Result<()> {
        self.backend.begin_tx()?;
        self.tracker.begin_transaction();

        if self.documents.remove(doc_id).is_none() {
            let _ = self.backend.abort_tx();
            self.tracker.end_transaction(false);
            return Err(LiteCoreError::NotFound);
        }
        if let Some(ts) = self.doc_expires_at.remove(doc_id) {
            self.expirations.remove(&(ts, doc_id.to_string()));
        }
        let _ = self.backend.delete(Keyspace::Documents, doc_id.as_bytes());
        self.tracker.document_purged(doc_id);

        self.backend.commit_tx()?;
        self.tracker.end_transaction(true);
        Ok(())
    }

    pub fn set_expiration(&mut self, doc_id: &str, timestamp_ms: Option<i64>) -> Result<()> {
        if !self.documents.contains_key(doc_id) {
            return Err(LiteCoreError::NotFound);
        }
        if let Some(old) = self.doc_expires_at.remove(doc_id) {
            self.expirations.remove(&(old, doc_id.to_string()));
        }
        if let Some(ts) = timestamp_ms {
            self.doc_expires_at.insert(doc_id.to_string(), ts);
            self.expirations.insert((ts, doc_id.to_string()), ());
        }
        Ok(())
    }

    pub fn get_expiration(&self, doc_id: &str) -> Result<Option<i64>> {
        if !self.documents.contains_key(doc_id) {
            return Err(LiteCoreError::NotFound);
        }
        Ok(self.doc_expires_at.get(doc_id).copied())
    }

    pub fn next_doc_expiration(&self) -> Option<i64> {
        self.expirations.keys().next().map(|(ts, _)| *ts)
    }

    /// Purges every document whose expiration is `<= now_ms`, returning the
    /// purged docIDs.
    pub fn purge_expired_docs(&mut self, now_ms: i64) -> Result<Vec<String>> {
        let due: Vec<String> = self
            .expirations
            .keys()
            .filter(|(ts, _)| *ts <= now_ms)
            .map(|(_, id)| id.clone())
            .collect();
        for id in &due {
            self.purge(id)?;
        }
        Ok(due)
    }

    pub fn find_doc_ancestors(&self, doc_id: &str, candidate_rev_id: &RevId, max_ancestors: usize) -> Result<AncestorFlags> {
        let (doc, tree) = self.documents.get(doc_id).ok_or(LiteCoreError::NotFound)?;
        Ok(super::ancestors::find_doc_ancestors(tree, &doc.current_rev_id, candidate_rev_id, max_ancestors))
    }

    /// `markDocumentSynced(docID, revID, sequence, remoteID)` (spec.md §4.2).
    pub fn mark_document_synced(&mut self, doc_id: &str, rev_id: RevId, _sequence: u64, remote: RemoteId) -> Result<()> {
        let (doc, _) = self.documents.get_mut(doc_id).ok_or(LiteCoreError::NotFound)?;
        doc.set_remote_ancestor(remote, rev_id);
        Ok(())
    }

    pub fn create_index(&mut self, name: &str, expression: &str) -> Result<()> {
        self.index_delegate.create_index(name, expression)
    }

    pub fn delete_index(&mut self, name: &str) -> Result<()> {
        self.index_delegate.delete_index(name)
    }

    pub fn get_index_rows(&self, name: &str) -> Result<Vec<serde_json::Value>> {
        self.index_delegate.get_index_rows(name)
    }

    /// Enumerates docIDs, ascending, for scan-based replication pushes.
    pub fn enumerate_doc_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.documents.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl<S: KeyValueStore, D: IndexDelegate> CollectionStore<S, D> {
    /// Raw enumeration pass-through, used by callers that need the backing
    /// store's own ordering/bounds rather than the in-memory document map
    /// (spec.md §6's `enumerate`).
    pub fn enumerate_raw(&self, keyspace: Keyspace, order: EnumerationOrder) -> Result<Vec<(Vec<u8>, StoredValue)>> {
        self.backend.enumerate(keyspace, None, None, order)
    }

    /// Raw write pass-through for callers that manage their own keyspace
    /// outside the document model, namely [`crate::checkpoint::Checkpointer`]
    /// saving its persisted record into `Keyspace::Checkpoints`.
    pub fn put_raw(&mut self, keyspace: Keyspace, key: &[u8], value: StoredValue) -> Result<()> {
        self.backend.put(keyspace, key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn store() -> CollectionStore<MemoryStore> {
        CollectionStore::new(MemoryStore::new())
    }

    #[test]
    fn put_creates_a_new_document() {
        let mut cs = store();
        let (doc, _) = cs.put(PutRequest::new_local("doc1", json!({"a": 1}), None)).unwrap();
        assert!(doc.exists());
        assert_eq!(doc.current_rev_id.generation(), Some(1));
    }

    #[test]
    fn put_on_existing_doc_without_parent_conflicts() {
        let mut cs = store();
        cs.put(PutRequest::new_local("doc1", json!({"a": 1}), None)).unwrap();
        let err = cs.put(PutRequest::new_local("doc1", json!({"a": 2}), None)).unwrap_err();
        assert!(matches!(err, LiteCoreError::Conflict));
    }

    #[test]
    fn put_with_correct_parent_creates_a_new_generation() {
        let mut cs = store();
        let (doc1, _) = cs.put(PutRequest::new_local("doc1", json!({"a": 1}), None)).unwrap();
        let (doc2, _) = cs.put(PutRequest::new_local("doc1", json!({"a": 2}), Some(doc1.current_rev_id.clone()))).unwrap();
        assert_eq!(doc2.current_rev_id.generation(), Some(2));
    }

    #[test]
    fn get_returns_not_found_for_missing_doc() {
        let cs = store();
        assert!(matches!(cs.get("nope", ContentLevel::MetadataOnly), Err(LiteCoreError::NotFound)));
    }

    #[test]
    fn purge_removes_the_document_entirely() {
        let mut cs = store();
        cs.put(PutRequest::new_local("doc1", json!({}), None)).unwrap();
        cs.purge("doc1").unwrap();
        assert!(matches!(cs.get("doc1", ContentLevel::MetadataOnly), Err(LiteCoreError::NotFound)));
    }

    #[test]
    fn expiration_round_trips_and_orders_by_time() {
        let mut cs = store();
        cs.put(PutRequest::new_local("doc1", json!({}), None)).unwrap();
        cs.put(PutRequest::new_local("doc2", json!({}), None)).unwrap();
        cs.set_expiration("doc1", Some(200)).unwrap();
        cs.set_expiration("doc2", Some(100)).unwrap();
        assert_eq!(cs.next_doc_expiration(), Some(100));
        assert_eq!(cs.get_expiration("doc2").unwrap(), Some(100));
    }

    #[test]
    fn purge_expired_docs_removes_only_due_documents() {
        let mut cs = store();
        cs.put(PutRequest::new_local("doc1", json!({}), None)).unwrap();
        cs.put(PutRequest::new_local("doc2", json!({}), None)).unwrap();
        cs.set_expiration("doc1", Some(100)).unwrap();
        cs.set_expiration("doc2", Some(500)).unwrap();

        let purged = cs.purge_expired_docs(200).unwrap();
        assert_eq!(purged, vec!["doc1".to_string()]);
        assert!(cs.get("doc2", ContentLevel::MetadataOnly).is_ok());
    }

    #[test]
    fn put_existing_revision_grafts_a_replicated_chain() {
        let mut cs = store();
        let (doc1, _) = cs.put(PutRequest::new_local("doc1", json!({"v": 1}), None)).unwrap();

        let history = vec![RevId::parse("3-cc").unwrap(), RevId::parse("2-bb").unwrap(), doc1.current_rev_id.clone()];
        let (doc2, common_idx) = cs
            .put(PutRequest::existing("doc1", Some(json!({"v": 3})), history, false))
            .unwrap();

        assert_eq!(doc2.current_rev_id, RevId::parse("3-cc").unwrap());
        assert_eq!(common_idx, 2);
    }

    #[test]
    fn mark_document_synced_records_the_remote_ancestor() {
        let mut cs = store();
        let (doc, _) = cs.put(PutRequest::new_local("doc1", json!({}), None)).unwrap();
        cs.mark_document_synced("doc1", doc.current_rev_id.clone(), doc.sequence, RemoteId(1)).unwrap();
        let fetched = cs.get("doc1", ContentLevel::MetadataOnly).unwrap();
        assert_eq!(fetched.remote_ancestor(RemoteId(1)), Some(&doc.current_rev_id));
    }

    #[test]
    fn a_conflicting_graft_sets_the_conflicted_flag_and_keeps_both_leaves() {
        let mut cs = store();
        let (doc1, _) = cs.put(PutRequest::new_local("doc1", json!({"writer": "a"}), None)).unwrap();
        cs.put(PutRequest::new_local("doc1", json!({"writer": "a", "n": 2}), Some(doc1.current_rev_id.clone()))).unwrap();

        let incoming = RevId::parse("2-ffeeddccbbaa9988").unwrap();
        let history = vec![incoming.clone(), doc1.current_rev_id.clone()];
        let (doc2, _) = cs.put(PutRequest::existing("doc1", Some(json!({"writer": "b"})), history, true)).unwrap();

        assert!(doc2.is_conflicted());
        assert_eq!(cs.get_all_revisions("doc1").unwrap().iter().filter(|r| r.is_leaf() && !r.is_closed()).count(), 2);
    }

    #[test]
    fn find_doc_ancestors_matches_the_standalone_helper() {
        let mut cs = store();
        let (doc, _) = cs.put(PutRequest::new_local("doc1", json!({}), None)).unwrap();
        let flags = cs.find_doc_ancestors("doc1", &doc.current_rev_id, 10).unwrap();
        assert!(flags.contains(AncestorFlags::SAME));
    }
}
