use crate::error::{LiteCoreError, Result};
use crate::revid::RevId;
use std::collections::HashMap;

/// Identifies one of the replication endpoints a document has been synced
/// with, so its per-remote ancestor pointer can be looked up independently
/// of any particular [`crate::revid::PeerId`] (spec.md §4.2:
/// "markDocumentSynced records, per remote, the revID last pushed/pulled").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteId(pub u32);

/// Document-level flags (spec.md §3, modeled on `C4DocumentFlags`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentFlags(u8);

impl DocumentFlags {
    pub const NONE: DocumentFlags = DocumentFlags(0);
    pub const EXISTS: DocumentFlags = DocumentFlags(1 << 0);
    pub const DELETED: DocumentFlags = DocumentFlags(1 << 1);
    pub const CONFLICTED: DocumentFlags = DocumentFlags(1 << 2);
    pub const HAS_ATTACHMENTS: DocumentFlags = DocumentFlags(1 << 3);

    pub fn contains(self, other: DocumentFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: DocumentFlags) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self, other: DocumentFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for DocumentFlags {
    type Output = DocumentFlags;
    fn bitor(self, rhs: DocumentFlags) -> DocumentFlags {
        DocumentFlags(self.0 | rhs.0)
    }
}

/// docIDs are 1-240 bytes of valid UTF-8, no control characters, and may not
/// begin with `_` (spec.md §4.2, reserved prefix for internal use).
pub fn validate_doc_id(doc_id: &str) -> Result<()> {
    let len = doc_id.len();
    if len == 0 || len > 240 {
        return Err(LiteCoreError::BadDocId(format!("length {len} out of range 1..=240")));
    }
    if doc_id.starts_with('_') {
        return Err(LiteCoreError::BadDocId("docIDs starting with `_` are reserved".into()));
    }
    if doc_id.chars().any(|c| c.is_control()) {
        return Err(LiteCoreError::BadDocId("docIDs may not contain control characters".into()));
    }
    Ok(())
}

/// The current (most-recently-loaded) view of a document: its winning
/// revision plus enough metadata to navigate the rest of its tree (spec.md
/// §3/§4.2). Grounded on
/// `examples/original_source/C/Cpp_include/c4Document.hh`'s `C4Document`.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    pub sequence: u64,
    pub flags: DocumentFlags,
    pub current_rev_id: RevId,
    pub body: Option<serde_json::Value>,
    /// One revID per remote this document has been synced with.
    pub remote_ancestors: HashMap<RemoteId, RevId>,
}

impl Document {
    pub fn new(doc_id: String, current_rev_id: RevId, body: Option<serde_json::Value>, flags: DocumentFlags) -> Self {
        Self { doc_id, sequence: 0, flags, current_rev_id, body, remote_ancestors: HashMap::new() }
    }

    pub fn exists(&self) -> bool {
        self.flags.contains(DocumentFlags::EXISTS)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(DocumentFlags::DELETED)
    }

    pub fn is_conflicted(&self) -> bool {
        self.flags.contains(DocumentFlags::CONFLICTED)
    }

    pub fn remote_ancestor(&self, remote: RemoteId) -> Option<&RevId> {
        self.remote_ancestors.get(&remote)
    }

    pub fn set_remote_ancestor(&mut self, remote: RemoteId, rev_id: RevId) {
        self.remote_ancestors.insert(remote, rev_id);
    }
}
