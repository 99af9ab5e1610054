//! Revision Model: parse, format, and compare revision identifiers in both
//! tree form (`gen-hash`) and version form (`time@peer`), plus version
//! vectors (spec.md §4.1).
//!
//! Grounded on `examples/original_source/LiteCore/RevTrees/Version.{cc,hh}`
//! for the two-form split and the `*`-local-peer abbreviation; the version
//! form here is timestamp-keyed rather than generation-keyed because
//! spec.md §3/§4.1 explicitly redefines it that way ("the timestamp of a
//! version ID is decoded into a 64-bit nanoseconds-since-epoch value").
//! The vector bookkeeping itself follows the shape of the teacher's
//! `replication::sync::VersionVector` / `replication::types::HLCTimestamp`.

mod history;
mod tree;
mod version;

pub use history::format_history;
pub use tree::TreeRevId;
pub use version::{PeerId, VersionId, VersionVector};

use crate::error::{LiteCoreError, Result};

/// The result of comparing two revision IDs or version vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
    Same,
    Older,
    Newer,
    Conflicting,
}

impl VersionOrder {
    /// `compare(a, b)` is antisymmetric: reversing operands flips
    /// Older/Newer and leaves Same/Conflicting unchanged (spec.md §8 #3).
    pub fn reversed(self) -> VersionOrder {
        match self {
            VersionOrder::Same => VersionOrder::Same,
            VersionOrder::Older => VersionOrder::Newer,
            VersionOrder::Newer => VersionOrder::Older,
            VersionOrder::Conflicting => VersionOrder::Conflicting,
        }
    }
}

/// A revision identifier in either tree or version form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevId {
    Tree(TreeRevId),
    Version(VersionId),
}

impl RevId {
    /// Auto-detects form: a token containing `@` is version form, otherwise
    /// it must be `<gen>-<hex>`. `*` is accepted in the peer position
    /// (local-storage abbreviation); use [`RevId::parse_wire`] to reject it.
    pub fn parse(s: &str) -> Result<RevId> {
        if s.contains('@') {
            Ok(RevId::Version(VersionId::parse(s, true)?))
        } else {
            Ok(RevId::Tree(TreeRevId::parse(s)?))
        }
    }

    /// Parses a revision ID received from a peer. The wire encoding never
    /// transmits the `*` local-peer abbreviation (spec.md §6), so this
    /// rejects it where [`RevId::parse`] would accept it.
    pub fn parse_wire(s: &str) -> Result<RevId> {
        if s.contains('@') {
            Ok(RevId::Version(VersionId::parse(s, false)?))
        } else {
            Ok(RevId::Tree(TreeRevId::parse(s)?))
        }
    }

    /// Local-storage formatting: version IDs authored by the local peer are
    /// abbreviated to `*`.
    pub fn format(&self) -> String {
        match self {
            RevId::Tree(t) => t.format(),
            RevId::Version(v) => v.format(None),
        }
    }

    /// Formatting for sharing with a peer: the local peer ID (well-known
    /// value 0) is substituted with `local_peer` and the `*` abbreviation
    /// is never emitted (spec.md §6).
    pub fn format_for_peer(&self, local_peer: PeerId) -> String {
        match self {
            RevId::Tree(t) => t.format(),
            RevId::Version(v) => v.format(Some(local_peer)),
        }
    }

    /// Tree-form generation number; `None` for version form (spec.md §4.1:
    /// "for version form, undefined — callers must switch on form").
    pub fn generation(&self) -> Option<u64> {
        match self {
            RevId::Tree(t) => Some(t.generation),
            RevId::Version(_) => None,
        }
    }

    pub fn is_tree_form(&self) -> bool {
        matches!(self, RevId::Tree(_))
    }

    pub fn is_version_form(&self) -> bool {
        matches!(self, RevId::Version(_))
    }
}

impl std::fmt::Display for RevId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Lifts a tree-form ID into a synthetic [`VersionId`] for mixed-form
/// comparison, per spec.md §4.1's "standard lifting":
/// `tree ID g-d ≡ version (g<<40 | top40(d)) @ wellKnownPeer`.
fn lift_tree(t: &TreeRevId) -> VersionId {
    let mut top40: u64 = 0;
    for &byte in t.digest.iter().take(5) {
        top40 = (top40 << 8) | byte as u64;
    }
    top40 &= (1u64 << 40) - 1;
    let synthetic = (t.generation << 40) | top40;
    VersionId { timestamp_ns: synthetic, peer: PeerId::LOCAL }
}

/// Compares two revision IDs (spec.md §4.1). `equal` iff this yields `Same`.
pub fn compare(a: &RevId, b: &RevId) -> VersionOrder {
    match (a, b) {
        (RevId::Tree(ta), RevId::Tree(tb)) => compare_tree(ta, tb),
        (RevId::Version(va), RevId::Version(vb)) => compare_version(va, vb),
        (RevId::Tree(ta), RevId::Version(vb)) => compare_version(&lift_tree(ta), vb),
        (RevId::Version(va), RevId::Tree(tb)) => compare_version(va, &lift_tree(tb)),
    }
}

fn compare_tree(a: &TreeRevId, b: &TreeRevId) -> VersionOrder {
    use std::cmp::Ordering::*;
    match a.generation.cmp(&b.generation) {
        Less => VersionOrder::Older,
        Greater => VersionOrder::Newer,
        Equal => {
            if a.digest == b.digest {
                VersionOrder::Same
            } else {
                VersionOrder::Conflicting
            }
        }
    }
}

fn compare_version(a: &VersionId, b: &VersionId) -> VersionOrder {
    use std::cmp::Ordering::*;
    if a.peer != b.peer {
        return VersionOrder::Conflicting;
    }
    match a.timestamp_ns.cmp(&b.timestamp_ns) {
        Less => VersionOrder::Older,
        Greater => VersionOrder::Newer,
        Equal => VersionOrder::Same,
    }
}

pub fn validate_not_zero_generation(gen: u64) -> Result<()> {
    if gen == 0 {
        Err(LiteCoreError::BadRevisionId("generation 0 is never valid".into()))
    } else {
        Ok(())
    }
}
