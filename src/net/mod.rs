//! Cookie store (spec.md §6, "Cookie store"): out of deep scope, but the
//! core's public interface carries it, so it is specified here to the
//! narrow depth the spec calls for.

pub mod cookie;

pub use cookie::{Cookie, CookieStore};
