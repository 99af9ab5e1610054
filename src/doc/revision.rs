use crate::revid::RevId;

/// Flags carried by a single revision-tree node (spec.md §3, modeled on
/// `examples/original_source/C/include/c4DocumentTypes.h`'s `C4RevisionFlags`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevisionFlags(u8);

impl RevisionFlags {
    pub const NONE: RevisionFlags = RevisionFlags(0);
    /// This revision is a tombstone (the document was deleted as of here).
    pub const DELETED: RevisionFlags = RevisionFlags(1 << 0);
    /// No child revisions exist — a tip of the tree.
    pub const LEAF: RevisionFlags = RevisionFlags(1 << 1);
    /// Created locally and not yet pushed to any remote.
    pub const NEW: RevisionFlags = RevisionFlags(1 << 2);
    /// Carries one or more attachments/blobs.
    pub const HAS_ATTACHMENTS: RevisionFlags = RevisionFlags(1 << 3);
    /// One of two or more conflicting current leaves.
    pub const IS_CONFLICT: RevisionFlags = RevisionFlags(1 << 4);
    /// Pinned out of winner selection and pruning (DESIGN.md Open Question
    /// #2): set on a leaf an application has explicitly resolved away from
    /// but wants retained for audit/undo purposes.
    pub const CLOSED: RevisionFlags = RevisionFlags(1 << 5);

    pub fn contains(self, other: RevisionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: RevisionFlags) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self, other: RevisionFlags) {
        self.0 &= !other.0;
    }

    pub fn with(mut self, other: RevisionFlags) -> RevisionFlags {
        self.set(other);
        self
    }
}

impl std::ops::BitOr for RevisionFlags {
    type Output = RevisionFlags;
    fn bitor(self, rhs: RevisionFlags) -> RevisionFlags {
        RevisionFlags(self.0 | rhs.0)
    }
}

/// One node of a document's revision tree.
#[derive(Debug, Clone)]
pub struct Revision {
    pub rev_id: RevId,
    pub parent: Option<RevId>,
    /// `None` when the body has been pruned from a non-current ancestor
    /// (spec.md §4.2: only leaves and a bounded ancestor window keep bodies).
    pub body: Option<serde_json::Value>,
    pub flags: RevisionFlags,
    /// Sequence number assigned when this revision became current, or the
    /// sequence at which it was superseded if it no longer is.
    pub sequence: u64,
}

impl Revision {
    pub fn new(rev_id: RevId, parent: Option<RevId>, body: Option<serde_json::Value>, flags: RevisionFlags) -> Self {
        Self { rev_id, parent, body, flags, sequence: 0 }
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(RevisionFlags::DELETED)
    }

    pub fn is_leaf(&self) -> bool {
        self.flags.contains(RevisionFlags::LEAF)
    }

    pub fn is_closed(&self) -> bool {
        self.flags.contains(RevisionFlags::CLOSED)
    }
}
