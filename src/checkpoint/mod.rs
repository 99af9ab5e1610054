//! Per-(database, remote, filter) replication-progress tracking (spec.md
//! §4.4). Grounded on `original_source/Replicator/Checkpointer.{cc,hh}`,
//! with persistence following the teacher's `SyncService` pattern of
//! hashing identity fields into a stable key.

mod checkpointer;
mod peer_checkpoints;
mod pending;

pub use checkpointer::{
    derive_checkpoint_id, normalize_remote_url, CheckpointScope, Checkpointer, PersistedCheckpoint, UrlNormalization,
};
pub use peer_checkpoints::PeerCheckpointStore;
pub use pending::PendingSequenceSet;
