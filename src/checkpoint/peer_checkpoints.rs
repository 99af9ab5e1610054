//! Passive-role checkpoint storage: what *other* peers have told us their
//! progress is, keyed by a peer-provided ID rather than one we derive
//! ourselves (spec.md §4.4 "Peer checkpoints (for passive role)").

use super::checkpointer::PersistedCheckpoint;
use crate::error::{LiteCoreError, Result};
use crate::storage::{EnumerationOrder, Keyspace, KeyValueStore, StoredValue};

/// Parses the `<generation>-cc` optimistic-concurrency token peer
/// checkpoints use in place of a real revision ID.
fn parse_generation(rev: &str) -> Option<u64> {
    let (gen, tag) = rev.split_once('-')?;
    if tag != "cc" {
        return None;
    }
    gen.parse().ok()
}

fn format_generation(gen: u64) -> String {
    format!("{gen}-cc")
}

/// Reads and writes the `peerCheckpoints` keyspace (spec.md §6). Each entry
/// is addressed by the remote peer's own ID string and carries a
/// generation-suffixed `rev` token; a `put` whose caller-supplied token
/// doesn't match what's stored fails with `Conflict` and leaves storage
/// untouched, the same optimistic-concurrency contract a replicator client
/// gets from a regular document put.
pub struct PeerCheckpointStore;

impl PeerCheckpointStore {
    pub fn get<S: KeyValueStore>(store: &S, peer_checkpoint_id: &str) -> Result<Option<PersistedCheckpoint>> {
        match store.get(Keyspace::Raw, peer_checkpoint_id.as_bytes())? {
            Some(stored) => Ok(Some(serde_json::from_slice(&stored.value)?)),
            None => Ok(None),
        }
    }

    /// `expected_rev` is the generation token the caller last read (`None`
    /// if creating a new entry). On success, the written checkpoint's `rev`
    /// is bumped to the next generation and returned.
    pub fn put<S: KeyValueStore>(
        store: &mut S,
        peer_checkpoint_id: &str,
        mut checkpoint: PersistedCheckpoint,
        expected_rev: Option<&str>,
    ) -> Result<String> {
        let current = Self::get(store, peer_checkpoint_id)?;
        let current_gen = current.as_ref().and_then(|c| c.rev.as_deref()).and_then(parse_generation).unwrap_or(0);

        match (expected_rev, current.is_some()) {
            (None, true) => return Err(LiteCoreError::Conflict),
            (Some(rev), _) => {
                if parse_generation(rev) != Some(current_gen) {
                    return Err(LiteCoreError::Conflict);
                }
            }
            (None, false) => {}
        }

        let new_rev = format_generation(current_gen + 1);
        checkpoint.rev = Some(new_rev.clone());
        let encoded = serde_json::to_vec(&checkpoint)?;
        store.put(Keyspace::Raw, peer_checkpoint_id.as_bytes(), StoredValue { value: encoded, meta: Vec::new() })?;
        Ok(new_rev)
    }

    pub fn all<S: KeyValueStore>(store: &S) -> Result<Vec<(String, PersistedCheckpoint)>> {
        let rows = store.enumerate(Keyspace::Raw, None, None, EnumerationOrder::Ascending)?;
        rows.into_iter()
            .map(|(k, v)| {
                let id = String::from_utf8_lossy(&k).into_owned();
                let checkpoint: PersistedCheckpoint = serde_json::from_slice(&v.value)?;
                Ok((id, checkpoint))
            })
            .collect()
    }
}
