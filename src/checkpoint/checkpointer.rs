use super::pending::PendingSequenceSet;
use crate::collection::{CollectionStore, ContentLevel, IndexDelegate};
use crate::error::{LiteCoreError, Result};
use crate::storage::KeyValueStore;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// The persisted checkpoint record: a compact `{local, remote, rev}` dictionary
/// (spec.md §6, "Persisted checkpoint format").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCheckpoint {
    pub local: u64,
    pub remote: Option<String>,
    /// Generation-suffixed optimistic-concurrency token, only meaningful
    /// for peer checkpoints (see [`super::peer_checkpoints`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
}

/// Inputs to checkpoint identity derivation (spec.md §4.4). Everything here
/// is hashed into the docID; two replications that differ in any of these
/// fields get independent checkpoints.
#[derive(Debug, Clone, Default)]
pub struct CheckpointScope {
    pub remote_url: String,
    pub channels: Option<Vec<String>>,
    pub filter_name: Option<String>,
    pub filter_params: Option<serde_json::Value>,
    pub doc_ids: Option<Vec<String>>,
}

/// How a remote URL's port is normalized before hashing, tried in this
/// order on first open (spec.md §4.4 `[ADD]`): historical peers disagreed
/// on whether the scheme's default port belonged in the hashed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlNormalization {
    AsIs,
    ForceStandardPortPresent,
    ForceStandardPortAbsent,
}

impl UrlNormalization {
    /// The order first-open probing tries variants in.
    pub const PROBE_ORDER: [UrlNormalization; 3] =
        [UrlNormalization::AsIs, UrlNormalization::ForceStandardPortPresent, UrlNormalization::ForceStandardPortAbsent];
}

fn standard_port_for_scheme(scheme: &str) -> Option<u16> {
    match scheme {
        "ws" | "http" => Some(80),
        "wss" | "https" => Some(443),
        _ => None,
    }
}

/// Splits `scheme://host[:port]/rest` into its pieces. Anything this crate
/// hashes is already a well-formed replicator URL by the time it gets here,
/// so this is deliberately a minimal splitter rather than a general URL
/// parser.
struct SplitUrl<'a> {
    scheme: &'a str,
    host: &'a str,
    port: Option<u16>,
    rest: &'a str,
}

fn split_url(url: &str) -> Option<SplitUrl<'_>> {
    let (scheme, after_scheme) = url.split_once("://")?;
    let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
    let (authority, rest) = after_scheme.split_at(authority_end);
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) if !h.is_empty() && p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty() => {
            (h, p.parse::<u16>().ok())
        }
        _ => (authority, None),
    };
    Some(SplitUrl { scheme, host, port, rest })
}

/// Normalizes `url` according to `variant`. Falls back to the input
/// unchanged if it doesn't parse as `scheme://host[:port][/path]`.
pub fn normalize_remote_url(url: &str, variant: UrlNormalization) -> String {
    let Some(split) = split_url(url) else { return url.to_string() };
    let standard_port = standard_port_for_scheme(split.scheme);

    let port = match variant {
        UrlNormalization::AsIs => split.port,
        UrlNormalization::ForceStandardPortPresent => split.port.or(standard_port),
        UrlNormalization::ForceStandardPortAbsent => split.port.filter(|p| Some(*p) != standard_port),
    };

    match port {
        Some(p) => format!("{}://{}:{}{}", split.scheme, split.host, p, split.rest),
        None => format!("{}://{}{}", split.scheme, split.host, split.rest),
    }
}

/// Builds the canonical tuple encoding that gets SHA-1/base64'd into a
/// checkpoint docID (spec.md §6). A plain JSON array keeps field order
/// stable without inventing a bespoke binary format.
fn canonical_tuple_encoding(local_private_uuid: &uuid::Uuid, normalized_url: &str, scope: &CheckpointScope) -> Vec<u8> {
    let tuple = serde_json::json!([
        local_private_uuid.to_string(),
        normalized_url,
        scope.channels,
        scope.filter_name,
        scope.filter_params,
        scope.doc_ids,
    ]);
    serde_json::to_vec(&tuple).expect("JSON encoding of a tuple of strings/options cannot fail")
}

/// `cp-` + base64(SHA-1(canonicalTupleEncoding(...))), using `url` normalized
/// by `variant` (spec.md §4.4 / §6).
pub fn derive_checkpoint_id(local_private_uuid: &uuid::Uuid, scope: &CheckpointScope, variant: UrlNormalization) -> String {
    let normalized = normalize_remote_url(&scope.remote_url, variant);
    let encoded = canonical_tuple_encoding(local_private_uuid, &normalized, scope);
    let digest = Sha1::digest(&encoded);
    format!("cp-{}", base64::engine::general_purpose::STANDARD.encode(digest))
}

/// Per-(database, remote, filter) replication-progress record (spec.md
/// §4.4). Holds the push/pull cursors, the sparse pending-sequence set, and
/// autosave bookkeeping; persists through a [`CollectionStore`]'s
/// `Checkpoints` keyspace via its raw-document access.
pub struct Checkpointer {
    id: String,
    scope: CheckpointScope,
    local_min_sequence: u64,
    remote_min_sequence: Option<String>,
    pending: PendingSequenceSet,
    dirty: bool,
    saving: bool,
    overdue_for_save: bool,
}

impl Checkpointer {
    /// Opens (or creates) the checkpoint identified by `scope` against
    /// `store`, trying the three URL-normalization variants in order and
    /// adopting the first one whose checkpoint already exists. If none
    /// exist, a fresh checkpoint is created under the as-is (canonical)
    /// form.
    pub fn open<S: KeyValueStore, D: IndexDelegate>(
        store: &CollectionStore<S, D>,
        local_private_uuid: &uuid::Uuid,
        scope: CheckpointScope,
    ) -> Result<Self> {
        for variant in UrlNormalization::PROBE_ORDER {
            let id = derive_checkpoint_id(local_private_uuid, &scope, variant);
            if let Some(persisted) = load_persisted(store, &id)? {
                return Ok(Self::from_persisted(id, scope, persisted));
            }
        }

        let id = derive_checkpoint_id(local_private_uuid, &scope, UrlNormalization::AsIs);
        Ok(Self {
            id,
            scope,
            local_min_sequence: 0,
            remote_min_sequence: None,
            pending: PendingSequenceSet::new(0),
            dirty: false,
            saving: false,
            overdue_for_save: false,
        })
    }

    fn from_persisted(id: String, scope: CheckpointScope, persisted: PersistedCheckpoint) -> Self {
        Self {
            id,
            scope,
            local_min_sequence: persisted.local,
            remote_min_sequence: persisted.remote,
            pending: PendingSequenceSet::new(persisted.local),
            dirty: false,
            saving: false,
            overdue_for_save: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn local_min_sequence(&self) -> u64 {
        self.local_min_sequence
    }

    pub fn remote_min_sequence(&self) -> Option<&str> {
        self.remote_min_sequence.as_deref()
    }

    pub fn add_pending_sequence(&mut self, seq: u64) {
        self.pending.add_pending_sequence(seq);
        self.mark_dirty();
    }

    pub fn completed_sequence(&mut self, seq: u64) {
        self.pending.completed_sequence(seq);
        self.local_min_sequence = self.pending.base();
        self.mark_dirty();
    }

    pub fn is_sequence_completed(&self, seq: u64) -> bool {
        self.pending.is_sequence_completed(seq)
    }

    pub fn pending_sequence_count(&self) -> usize {
        self.pending.pending_sequence_count()
    }

    pub fn set_remote_min_sequence(&mut self, token: impl Into<String>) {
        self.remote_min_sequence = Some(token.into());
        self.mark_dirty();
    }

    /// Reconciles against a checkpoint the peer has stored for us. Returns
    /// `false` (and resets the disagreeing cursor) if the peer's record
    /// disagrees with ours, per spec.md §4.4.
    pub fn validate_with(&mut self, remote_checkpoint: &PersistedCheckpoint) -> bool {
        let mut valid = true;

        if remote_checkpoint.local != self.local_min_sequence {
            self.local_min_sequence = 0;
            self.pending = PendingSequenceSet::new(0);
            valid = false;
        }
        if remote_checkpoint.remote != self.remote_min_sequence {
            self.remote_min_sequence = None;
            valid = false;
        }

        if !valid {
            self.mark_dirty();
        }
        valid
    }

    pub fn to_persisted(&self) -> PersistedCheckpoint {
        PersistedCheckpoint { local: self.local_min_sequence, remote: self.remote_min_sequence.clone(), rev: None }
    }

    /// Enumerates every document past `local_min_sequence` whose sequence
    /// isn't already completed, applying the docID allow-list and (if
    /// present) the user's push filter, and invokes `callback` for the
    /// docIDs that remain (spec.md §4.4 `pendingDocumentIDs`).
    ///
    /// `configured_collections` must contain the collection this
    /// checkpoint's documents belong to, or this returns `NotOpen` — the
    /// checkpoint isn't meaningful against a collection the replicator
    /// wasn't configured to sync.
    pub fn pending_document_ids<S, D, F>(
        &self,
        store: &CollectionStore<S, D>,
        collection_name: &str,
        configured_collections: &[String],
        mut push_filter: Option<F>,
        mut callback: impl FnMut(&str),
    ) -> Result<()>
    where
        S: KeyValueStore,
        D: IndexDelegate,
        F: FnMut(&crate::doc::Document) -> bool,
    {
        if !configured_collections.iter().any(|c| c == collection_name) {
            return Err(LiteCoreError::NotOpen);
        }

        for doc_id in store.enumerate_doc_ids()? {
            let doc = store.get(&doc_id, ContentLevel::CurrentRevBody)?;
            if self.pending.is_sequence_completed(doc.sequence) {
                continue;
            }
            if let Some(allow_list) = &self.scope.doc_ids {
                if !allow_list.contains(&doc_id) {
                    continue;
                }
            }
            if let Some(filter) = push_filter.as_mut() {
                if !filter(&doc) {
                    continue;
                }
            }
            callback(&doc_id);
        }
        Ok(())
    }

    /// True iff `doc_id`'s current sequence is not yet completed and it
    /// passes the same filters `pending_document_ids` would apply.
    pub fn is_document_pending<S, D, F>(
        &self,
        store: &CollectionStore<S, D>,
        doc_id: &str,
        mut push_filter: Option<F>,
    ) -> Result<bool>
    where
        S: KeyValueStore,
        D: IndexDelegate,
        F: FnMut(&crate::doc::Document) -> bool,
    {
        let doc = match store.get(doc_id, ContentLevel::CurrentRevBody) {
            Ok(doc) => doc,
            Err(LiteCoreError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };
        if self.pending.is_sequence_completed(doc.sequence) {
            return Ok(false);
        }
        if let Some(allow_list) = &self.scope.doc_ids {
            if !allow_list.contains(&doc_id.to_string()) {
                return Ok(false);
            }
        }
        if let Some(filter) = push_filter.as_mut() {
            if !filter(&doc) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn mark_dirty(&mut self) {
        if self.saving {
            self.overdue_for_save = true;
        } else {
            self.dirty = true;
        }
    }

    /// Whether a save should be armed: there's unsaved state and no save is
    /// already in flight. The autosave actor calls this after every mutation
    /// to decide whether to (re)arm its timer.
    pub fn needs_save(&self) -> bool {
        self.dirty && !self.saving
    }

    /// Called by the autosave actor right before invoking the save
    /// callback; marks the save in flight so concurrent mutations set
    /// `overdue_for_save` instead of being lost.
    pub fn begin_save(&mut self) -> PersistedCheckpoint {
        self.dirty = false;
        self.saving = true;
        self.to_persisted()
    }

    /// Called once the save callback completes. Returns `true` if another
    /// save should be triggered immediately because mutations arrived while
    /// this one was in flight (spec.md §4.4 `_overdueForSave`).
    pub fn save_completed(&mut self) -> bool {
        self.saving = false;
        if self.overdue_for_save {
            self.overdue_for_save = false;
            self.dirty = true;
            true
        } else {
            false
        }
    }

    /// The autosave actor's save callback itself: a no-op when nothing is
    /// dirty, otherwise serializes the current `{local, remote}` tuple into
    /// `Keyspace::Checkpoints` under this checkpoint's docID and runs the
    /// `beginSave`/`saveCompleted` bookkeeping around the write (spec.md
    /// §4.4 "Autosave"). Returns whether another save is due immediately.
    pub fn save<S: KeyValueStore, D: IndexDelegate>(&mut self, store: &mut CollectionStore<S, D>) -> Result<bool> {
        if !self.needs_save() {
            return Ok(false);
        }
        let persisted = self.begin_save();
        let bytes = serde_json::to_vec(&persisted)?;
        store.put_raw(
            crate::storage::Keyspace::Checkpoints,
            self.id.as_bytes(),
            crate::storage::StoredValue { value: bytes, meta: Vec::new() },
        )?;
        Ok(self.save_completed())
    }
}

fn load_persisted<S: KeyValueStore, D: IndexDelegate>(
    store: &CollectionStore<S, D>,
    id: &str,
) -> Result<Option<PersistedCheckpoint>> {
    use crate::storage::{EnumerationOrder, Keyspace};

    let key = id.as_bytes();
    let rows = store.enumerate_raw(Keyspace::Checkpoints, EnumerationOrder::Ascending)?;
    for (k, v) in rows {
        if k == key {
            let parsed: PersistedCheckpoint = serde_json::from_slice(&v.value)?;
            return Ok(Some(parsed));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_is_normalization_preserves_an_explicit_nonstandard_port() {
        let normalized = normalize_remote_url("wss://sync.example.com:4985/db", UrlNormalization::AsIs);
        assert_eq!(normalized, "wss://sync.example.com:4985/db");
    }

    #[test]
    fn force_standard_port_present_adds_the_scheme_default() {
        let normalized = normalize_remote_url("wss://sync.example.com/db", UrlNormalization::ForceStandardPortPresent);
        assert_eq!(normalized, "wss://sync.example.com:443/db");
    }

    #[test]
    fn force_standard_port_absent_strips_an_explicit_default_port() {
        let normalized = normalize_remote_url("ws://sync.example.com:80/db", UrlNormalization::ForceStandardPortAbsent);
        assert_eq!(normalized, "ws://sync.example.com/db");
    }

    #[test]
    fn force_standard_port_absent_leaves_a_nonstandard_port_alone() {
        let normalized = normalize_remote_url("wss://sync.example.com:4985/db", UrlNormalization::ForceStandardPortAbsent);
        assert_eq!(normalized, "wss://sync.example.com:4985/db");
    }

    #[test]
    fn derive_checkpoint_id_is_deterministic_and_scope_sensitive() {
        let uuid = uuid::Uuid::nil();
        let scope_a = CheckpointScope { remote_url: "wss://sync.example.com/db".into(), ..Default::default() };
        let scope_b = CheckpointScope { remote_url: "wss://sync.example.com/other".into(), ..Default::default() };

        let id_a1 = derive_checkpoint_id(&uuid, &scope_a, UrlNormalization::AsIs);
        let id_a2 = derive_checkpoint_id(&uuid, &scope_a, UrlNormalization::AsIs);
        let id_b = derive_checkpoint_id(&uuid, &scope_b, UrlNormalization::AsIs);

        assert!(id_a1.starts_with("cp-"));
        assert_eq!(id_a1, id_a2);
        assert_ne!(id_a1, id_b);
    }

    #[test]
    fn different_url_normalization_variants_agree_once_normalized_forms_match() {
        let uuid = uuid::Uuid::nil();
        let scope_present =
            CheckpointScope { remote_url: "wss://sync.example.com:443/db".into(), ..Default::default() };
        let scope_bare = CheckpointScope { remote_url: "wss://sync.example.com/db".into(), ..Default::default() };

        let id_present = derive_checkpoint_id(&uuid, &scope_present, UrlNormalization::ForceStandardPortAbsent);
        let id_bare = derive_checkpoint_id(&uuid, &scope_bare, UrlNormalization::ForceStandardPortAbsent);
        assert_eq!(id_present, id_bare);
    }

    #[test]
    fn completing_sequences_advances_local_min_sequence() {
        let mut cp = Checkpointer {
            id: "cp-test".into(),
            scope: CheckpointScope::default(),
            local_min_sequence: 0,
            remote_min_sequence: None,
            pending: PendingSequenceSet::new(0),
            dirty: false,
            saving: false,
            overdue_for_save: false,
        };
        cp.add_pending_sequence(1);
        cp.add_pending_sequence(2);
        cp.completed_sequence(1);
        cp.completed_sequence(2);
        assert_eq!(cp.local_min_sequence(), 2);
        assert_eq!(cp.pending_sequence_count(), 0);
    }

    #[test]
    fn validate_with_disagreeing_local_resets_to_zero() {
        let mut cp = Checkpointer {
            id: "cp-test".into(),
            scope: CheckpointScope::default(),
            local_min_sequence: 10,
            remote_min_sequence: Some("tok".into()),
            pending: PendingSequenceSet::new(10),
            dirty: false,
            saving: false,
            overdue_for_save: false,
        };
        let remote = PersistedCheckpoint { local: 4, remote: Some("tok".into()), rev: None };
        assert!(!cp.validate_with(&remote));
        assert_eq!(cp.local_min_sequence(), 0);
    }

    #[test]
    fn validate_with_agreeing_state_returns_true_and_changes_nothing() {
        let mut cp = Checkpointer {
            id: "cp-test".into(),
            scope: CheckpointScope::default(),
            local_min_sequence: 10,
            remote_min_sequence: Some("tok".into()),
            pending: PendingSequenceSet::new(10),
            dirty: false,
            saving: false,
            overdue_for_save: false,
        };
        let remote = PersistedCheckpoint { local: 10, remote: Some("tok".into()), rev: None };
        assert!(cp.validate_with(&remote));
        assert_eq!(cp.local_min_sequence(), 10);
    }

    #[test]
    fn autosave_does_not_refire_without_a_new_mutation() {
        let mut cp = Checkpointer {
            id: "cp-test".into(),
            scope: CheckpointScope::default(),
            local_min_sequence: 0,
            remote_min_sequence: None,
            pending: PendingSequenceSet::new(0),
            dirty: true,
            saving: false,
            overdue_for_save: false,
        };
        assert!(cp.needs_save());
        let _ = cp.begin_save();
        assert!(!cp.needs_save());
        assert!(!cp.save_completed());
        assert!(!cp.needs_save());
    }

    #[test]
    fn saving_persists_the_checkpoint_for_a_later_open_to_find() {
        let mut store: CollectionStore<crate::storage::MemoryStore> =
            CollectionStore::new(crate::storage::MemoryStore::new());
        let uuid = uuid::Uuid::nil();
        let scope = CheckpointScope { remote_url: "wss://sync.example.com/db".into(), ..Default::default() };

        let mut cp = Checkpointer::open(&store, &uuid, scope.clone()).unwrap();
        cp.add_pending_sequence(1);
        cp.completed_sequence(1);
        assert!(!cp.save(&mut store).unwrap());

        let reopened = Checkpointer::open(&store, &uuid, scope).unwrap();
        assert_eq!(reopened.id(), cp.id());
        assert_eq!(reopened.local_min_sequence(), 1);
    }

    #[test]
    fn save_is_a_no_op_when_nothing_is_dirty() {
        let mut store: CollectionStore<crate::storage::MemoryStore> =
            CollectionStore::new(crate::storage::MemoryStore::new());
        let mut cp = Checkpointer::open(&store, &uuid::Uuid::nil(), CheckpointScope::default()).unwrap();
        let before = store.enumerate_raw(crate::storage::Keyspace::Checkpoints, crate::storage::EnumerationOrder::Ascending).unwrap();
        assert!(before.is_empty());
        assert!(!cp.save(&mut store).unwrap());
        let after = store.enumerate_raw(crate::storage::Keyspace::Checkpoints, crate::storage::EnumerationOrder::Ascending).unwrap();
        assert!(after.is_empty());
    }

    #[test]
    fn a_mutation_during_save_triggers_another_save_on_completion() {
        let mut cp = Checkpointer {
            id: "cp-test".into(),
            scope: CheckpointScope::default(),
            local_min_sequence: 0,
            remote_min_sequence: None,
            pending: PendingSequenceSet::new(0),
            dirty: true,
            saving: false,
            overdue_for_save: false,
        };
        let _ = cp.begin_save();
        cp.add_pending_sequence(5);
        assert!(cp.save_completed(), "mutation during save must force another save");
        assert!(cp.needs_save());
    }
}
