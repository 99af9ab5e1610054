use crate::revid::RevId;

/// How much of a document to load (spec.md §4.2 `get`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLevel {
    MetadataOnly,
    CurrentRevBody,
    AllRevsAndBodies,
}

/// Arguments to [`crate::collection::CollectionStore::put`] (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub doc_id: String,
    pub body: Option<serde_json::Value>,
    pub deleted: bool,
    /// When `false`, `parent` (if any) must be the document's current
    /// revision; a mismatch is a conflict. When `true`, `history` carries
    /// an externally authored new-to-old chain to graft onto the tree.
    pub existing_revision: bool,
    /// Only meaningful when `existing_revision` is `false`: the revision
    /// this write is based on (`None` for a brand-new document).
    pub parent: Option<RevId>,
    /// Only meaningful when `existing_revision` is `true`: `[r0, r1, …, rn]`
    /// new-to-old, with `body` belonging to `r0`.
    pub history: Vec<RevId>,
    pub allow_conflict: bool,
    pub save: bool,
}

impl PutRequest {
    /// A brand-new locally authored revision with the given parent
    /// (`None` creates the document).
    pub fn new_local(doc_id: impl Into<String>, body: serde_json::Value, parent: Option<RevId>) -> Self {
        Self {
            doc_id: doc_id.into(),
            body: Some(body),
            deleted: false,
            existing_revision: false,
            parent,
            history: Vec::new(),
            allow_conflict: false,
            save: true,
        }
    }

    /// An externally received chain, as delivered by a Puller.
    pub fn existing(doc_id: impl Into<String>, body: Option<serde_json::Value>, history: Vec<RevId>, allow_conflict: bool) -> Self {
        Self {
            doc_id: doc_id.into(),
            body,
            deleted: false,
            existing_revision: true,
            parent: None,
            history,
            allow_conflict,
            save: true,
        }
    }
}

/// Bitmask returned by `findDocAncestors` for one (docID, revID) input pair
/// (spec.md §4.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AncestorFlags(u8);

impl AncestorFlags {
    pub const NONE: AncestorFlags = AncestorFlags(0);
    pub const SAME: AncestorFlags = AncestorFlags(1 << 0);
    pub const LOCAL_IS_OLDER: AncestorFlags = AncestorFlags(1 << 1);
    pub const LOCAL_IS_NEWER: AncestorFlags = AncestorFlags(1 << 2);
    pub const REV_EXISTS_AT_REMOTE: AncestorFlags = AncestorFlags(1 << 3);
    pub const HAVE_LOCAL_BODY: AncestorFlags = AncestorFlags(1 << 4);

    pub fn contains(self, other: AncestorFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: AncestorFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for AncestorFlags {
    type Output = AncestorFlags;
    fn bitor(self, rhs: AncestorFlags) -> AncestorFlags {
        AncestorFlags(self.0 | rhs.0)
    }
}
