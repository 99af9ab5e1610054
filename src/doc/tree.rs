use super::revision::{Revision, RevisionFlags};
use crate::error::{LiteCoreError, Result};
use crate::revid::{self, RevId, VersionOrder};

/// A document's full revision tree plus the bookkeeping needed to graft new
/// history onto it and recompute the winning leaf.
///
/// Grounded on `examples/original_source/LiteCore/Database/Document.cc`'s
/// `putExistingRevision`/`selectCurrentRevision`, restructured as a small
/// owned `Vec<Revision>` rather than the original's pointer-linked node
/// pool — closer to the teacher's flat `Vec<T>` + linear-scan style seen in
/// `replication::sync`.
#[derive(Debug, Clone, Default)]
pub struct RevisionTree {
    nodes: Vec<Revision>,
}

impl RevisionTree {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, rev_id: &RevId) -> Option<&Revision> {
        self.nodes.iter().find(|r| &r.rev_id == rev_id)
    }

    pub fn contains(&self, rev_id: &RevId) -> bool {
        self.get(rev_id).is_some()
    }

    pub fn nodes(&self) -> &[Revision] {
        &self.nodes
    }

    /// All leaves not pinned `CLOSED` (eligible winner candidates), plus
    /// every closed leaf separately available via [`RevisionTree::nodes`].
    pub fn open_leaves(&self) -> impl Iterator<Item = &Revision> {
        self.nodes.iter().filter(|r| r.is_leaf() && !r.is_closed())
    }

    /// Winner rule (spec.md §3): non-deleted beats deleted; then higher
    /// generation (tree form) or later timestamp (version form); then
    /// lexicographically larger revID, bytewise on its formatted text.
    pub fn current_leaf(&self) -> Option<&Revision> {
        self.open_leaves().max_by(|a, b| {
            (!a.is_deleted())
                .cmp(&(!b.is_deleted()))
                .then_with(|| generation_like(&a.rev_id).cmp(&generation_like(&b.rev_id)))
                .then_with(|| a.rev_id.format().cmp(&b.rev_id.format()))
        })
    }

    /// True if `descendant` is reachable from `ancestor` by following parent
    /// pointers (spec.md §4.2 step 6, "is the new leaf a descendant of the
    /// previously current leaf").
    pub fn is_descendant(&self, descendant: &RevId, ancestor: &RevId) -> bool {
        if descendant == ancestor {
            return true;
        }
        let mut cursor = self.get(descendant);
        while let Some(rev) = cursor {
            match &rev.parent {
                Some(p) if p == ancestor => return true,
                Some(p) => cursor = self.get(p),
                None => return false,
            }
        }
        false
    }

    /// Inserts a brand-new locally authored revision as a child of
    /// `parent_id` (or as the tree's first node if `None`). Clears the
    /// parent's `LEAF` flag and marks the new node as the new leaf.
    pub fn insert_new(&mut self, rev_id: RevId, parent_id: Option<RevId>, body: Option<serde_json::Value>, mut flags: RevisionFlags) -> Result<()> {
        if self.contains(&rev_id) {
            return Err(LiteCoreError::InvalidParameter(format!("revision {rev_id} already exists")));
        }
        if let Some(ref p) = parent_id {
            let parent = self
                .nodes
                .iter_mut()
                .find(|r| &r.rev_id == p)
                .ok_or_else(|| LiteCoreError::InvalidParameter(format!("parent revision {p} not found")))?;
            parent.flags.clear(RevisionFlags::LEAF);
        }
        flags.set(RevisionFlags::LEAF);
        self.nodes.push(Revision::new(rev_id, parent_id, body, flags));
        Ok(())
    }

    /// Grafts an externally received new-to-old chain `[r0 (newest, with
    /// body), r1, …, rn]` onto the tree, per spec.md §4.2's
    /// `putExistingRevision` steps 2-4:
    ///   2. find the first `ri` already present (index `k`; `k = n+1` if
    ///      none match)
    ///   3. for `i` in `(k-1)..=0` insert a new node whose parent is the
    ///      existing node (or the one just inserted)
    ///   4. recompute the current leaf
    ///
    /// Returns the revID that became the new leaf tip of this chain
    /// (`chain[0].0`) so the caller can run the conflict check (step 6).
    pub fn graft_existing_chain(&mut self, chain: &[(RevId, Option<serde_json::Value>, RevisionFlags)]) -> Result<RevId> {
        if chain.is_empty() {
            return Err(LiteCoreError::InvalidParameter("empty revision chain".into()));
        }

        let existing_index = chain.iter().position(|(id, _, _)| self.contains(id));
        let k = existing_index.unwrap_or(chain.len());

        if k == 0 {
            // chain[0] already exists; nothing new to graft.
            return Ok(chain[0].0.clone());
        }

        let mut parent_id = if k < chain.len() { Some(chain[k].0.clone()) } else { None };

        for i in (0..k).rev() {
            let (rev_id, body, mut flags) = chain[i].clone();
            if let Some(ref p) = parent_id {
                if let Some(parent) = self.nodes.iter_mut().find(|r| &r.rev_id == p) {
                    parent.flags.clear(RevisionFlags::LEAF);
                }
            }
            if i > 0 {
                // Ancestors in the newly grafted run keep their bodies only
                // if explicitly flagged; leaf-ness is set below for i == 0.
                flags.clear(RevisionFlags::LEAF);
            } else {
                flags.set(RevisionFlags::LEAF);
            }
            self.nodes.push(Revision::new(rev_id.clone(), parent_id.clone(), body, flags));
            parent_id = Some(rev_id);
        }

        Ok(chain[0].0.clone())
    }

    /// Builds the new-to-old history chain from `leaf` back to the root (or
    /// to the first entry in `back_to`, inclusive), for use with
    /// [`crate::revid::format_history`].
    pub fn history_from(&self, leaf: &RevId) -> Vec<RevId> {
        let mut chain = Vec::new();
        let mut cursor = self.get(leaf);
        while let Some(rev) = cursor {
            chain.push(rev.rev_id.clone());
            cursor = rev.parent.as_ref().and_then(|p| self.get(p));
        }
        chain
    }
}

fn generation_like(id: &RevId) -> u64 {
    match id {
        RevId::Tree(t) => t.generation,
        RevId::Version(v) => v.timestamp_ns,
    }
}

/// Compares the candidate leaf's lineage against the previously current
/// leaf to classify a conflict the way [`RevId`] comparison would (used by
/// the Collection Store's `allowConflict=false` check, spec.md §4.2 step 6).
pub fn conflicts_with_current(tree: &RevisionTree, candidate: &RevId, previous_current: &RevId) -> bool {
    if tree.is_descendant(candidate, previous_current) {
        return false;
    }
    matches!(revid::compare(candidate, previous_current), VersionOrder::Conflicting | VersionOrder::Older)
}
