//! litecore — an embeddable document database core: multi-branch revision
//! history, a commit-ordered change tracker, replication checkpointing, and
//! a WebSocket-framed replicator state machine.
//!
//! This crate is deliberately scoped to the subsystems where the hard
//! engineering lives (see `SPEC_FULL.md` §1): revision-tree and
//! version-vector semantics, the sequence tracker, the checkpointer, and
//! the replicator. The on-disk SQLite layout beyond a thin key/value
//! interface, the query compiler, full-text/vector indexes, the blob
//! store's filesystem layout, and authentication UI are treated as
//! external collaborators.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod checkpoint;
pub mod collection;
pub mod config;
pub mod doc;
pub mod error;
pub mod net;
pub mod replicator;
pub mod revid;
pub mod storage;
pub mod support;
pub mod tracker;

pub use checkpoint::{CheckpointScope, Checkpointer};
pub use collection::{CollectionStore, ContentLevel, PutRequest};
pub use config::{load_config, CheckpointConfig, Config, DatabaseConfig, ReplicatorConfig};
pub use doc::{Document, DocumentFlags, Revision, RevisionFlags};
pub use error::{LiteCoreError, Result};
pub use replicator::{ConnectionState, Replicator, ReplicatorStatus};
pub use revid::{compare, PeerId, RevId, VersionOrder};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use tracker::{DatabaseObserver, SequenceTracker};
