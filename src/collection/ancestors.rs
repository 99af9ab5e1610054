use super::content::AncestorFlags;
use crate::doc::RevisionTree;
use crate::revid::{self, RevId, VersionOrder};

/// `findDocAncestors` for a single (docID, revID) input pair (spec.md
/// §4.2): classifies `candidate_rev_id` — a revision ID the Replicator has
/// seen claimed for this document, normally by a peer — against the
/// document's local tree and current revision, bounded to searching
/// `max_ancestors` steps up the current revision's lineage.
pub fn find_doc_ancestors(tree: &RevisionTree, current_rev: &RevId, candidate_rev_id: &RevId, max_ancestors: usize) -> AncestorFlags {
    let mut flags = AncestorFlags::NONE;

    if candidate_rev_id == current_rev {
        flags.set(AncestorFlags::SAME);
        flags.set(AncestorFlags::REV_EXISTS_AT_REMOTE);
        if tree.get(candidate_rev_id).is_some_and(|r| r.body.is_some()) {
            flags.set(AncestorFlags::HAVE_LOCAL_BODY);
        }
        return flags;
    }

    let lineage = tree.history_from(current_rev);
    let within_bound = lineage.iter().take(max_ancestors.max(1)).any(|r| r == candidate_rev_id);

    if within_bound {
        flags.set(AncestorFlags::REV_EXISTS_AT_REMOTE);
        flags.set(AncestorFlags::LOCAL_IS_NEWER);
    } else if tree.contains(candidate_rev_id) {
        flags.set(AncestorFlags::REV_EXISTS_AT_REMOTE);
    }

    if let Some(rev) = tree.get(candidate_rev_id) {
        if rev.body.is_some() {
            flags.set(AncestorFlags::HAVE_LOCAL_BODY);
        }
    }

    match revid::compare(current_rev, candidate_rev_id) {
        VersionOrder::Older => flags.set(AncestorFlags::LOCAL_IS_OLDER),
        VersionOrder::Newer => flags.set(AncestorFlags::LOCAL_IS_NEWER),
        VersionOrder::Same | VersionOrder::Conflicting => {}
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::RevisionFlags;
    use serde_json::json;

    fn rev(s: &str) -> RevId {
        RevId::parse(s).unwrap()
    }

    #[test]
    fn identical_revisions_are_flagged_same() {
        let mut tree = RevisionTree::new();
        tree.insert_new(rev("1-aa"), None, Some(json!({})), RevisionFlags::NONE).unwrap();
        let flags = find_doc_ancestors(&tree, &rev("1-aa"), &rev("1-aa"), 10);
        assert!(flags.contains(AncestorFlags::SAME));
        assert!(flags.contains(AncestorFlags::HAVE_LOCAL_BODY));
    }

    #[test]
    fn candidate_that_is_a_known_ancestor_marks_local_newer() {
        let mut tree = RevisionTree::new();
        tree.insert_new(rev("1-aa"), None, Some(json!({})), RevisionFlags::NONE).unwrap();
        tree.insert_new(rev("2-bb"), Some(rev("1-aa")), Some(json!({})), RevisionFlags::NONE).unwrap();

        let flags = find_doc_ancestors(&tree, &rev("2-bb"), &rev("1-aa"), 10);
        assert!(flags.contains(AncestorFlags::LOCAL_IS_NEWER));
        assert!(flags.contains(AncestorFlags::REV_EXISTS_AT_REMOTE));
        assert!(!flags.contains(AncestorFlags::SAME));
    }

    #[test]
    fn unknown_candidate_is_neither_same_nor_known() {
        let mut tree = RevisionTree::new();
        tree.insert_new(rev("1-aa"), None, Some(json!({})), RevisionFlags::NONE).unwrap();
        let flags = find_doc_ancestors(&tree, &rev("1-aa"), &rev("5-ff"), 10);
        assert!(!flags.contains(AncestorFlags::REV_EXISTS_AT_REMOTE));
        assert!(flags.contains(AncestorFlags::LOCAL_IS_OLDER));
    }
}
