//! Sequence Tracker: an in-memory, commit-ordered change log with
//! placeholder-based observers (spec.md §4.3).
//!
//! Grounded on
//! `examples/original_source/LiteCore/Database/SequenceTracker.{cc,hh}`;
//! restructured from an intrusive doubly linked list onto a `VecDeque`, in
//! the teacher's own preference for flat, owned collections over
//! pointer-linked data structures (see `replication::sync`'s plain `Vec`
//! usage for its changelog).

mod observer;
mod sequence_tracker;

pub use observer::{DatabaseObserver, DocumentObserver};
pub use sequence_tracker::{ChangeEntry, ObserverId, PlaceholderHandle, SequenceTracker, SequenceTrackerConfig, DEFAULT_MIN_CHANGES_TO_KEEP};
