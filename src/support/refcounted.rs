//! Composition-over-inheritance handle primitive (spec.md §9: "multiple
//! inheritance decomposes into composition: a single refcount header plus
//! an optional instance-tracking mixin that borrows the refcount").

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A cheaply-cloneable, reference-counted handle to `T`.
///
/// This is a thin wrapper over `Arc<T>`; it exists as a distinct type so
/// that `InstanceCounted` can be mixed in without every handle type needing
/// to reimplement instance tracking itself.
#[derive(Debug)]
pub struct RefCounted<T> {
    inner: Arc<T>,
}

impl<T> RefCounted<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(value) }
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<T> Clone for RefCounted<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> std::ops::Deref for RefCounted<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

/// A mixin tracking how many live instances of some type exist
/// process-wide, independent of any one instance's own refcount. Types that
/// are both reference-counted and need a global instance census (e.g. for
/// leak detection in tests) borrow this alongside `RefCounted`.
pub struct InstanceCounted {
    count: Arc<AtomicUsize>,
}

impl InstanceCounted {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self { count }
    }

    pub fn live(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Drop for InstanceCounted {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}
