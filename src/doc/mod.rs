//! Document and revision-tree types (spec.md §3, §4.2).
//!
//! Grounded on `examples/original_source/C/include/c4DocumentTypes.h` and
//! `C/Cpp_include/c4Document.hh` for the flag sets and document lifecycle;
//! struct/derive style follows the teacher's `model.rs::Backend`.

mod document;
mod revision;
mod tree;

pub use document::{validate_doc_id, Document, DocumentFlags, RemoteId};
pub use revision::{Revision, RevisionFlags};
pub use tree::{conflicts_with_current, RevisionTree};
