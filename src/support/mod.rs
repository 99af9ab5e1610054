//! Shared plumbing used by every layer above it: an actor runtime, a
//! reference-counted handle primitive, and a database pool.

pub mod actor;
pub mod pool;
pub mod refcounted;

pub use actor::{spawn_actor, ActorHandle};
pub use pool::DatabasePool;
pub use refcounted::RefCounted;
