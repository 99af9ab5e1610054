//! Database pool: exclusive-writer, multi-reader (spec.md §5).
//!
//! Generalizes the acquire/release-with-scoped-guard pattern from the
//! teacher's `infrastructure::connection_pool::ConnectionPool`, but for a
//! fixed-size reader pool plus a single writer slot rather than a growable
//! per-backend pool of TCP connections.

use std::collections::VecDeque;
use tokio::sync::{Mutex, MutexGuard, Semaphore, SemaphorePermit};

/// Default number of reader handles a pool keeps open, per spec.md §5.
pub const DEFAULT_READER_COUNT: usize = 5;

/// A pool of `H` database handles: one writer, `N` readers.
///
/// `H` is typically an opened connection handle (e.g. a `rusqlite::Connection`
/// wrapped for `Send`, or an in-memory store handle). `borrow()` blocks until
/// a reader is free; `borrow_writeable()` blocks until the writer is free.
/// Both return scoped guards that release the handle on drop.
pub struct DatabasePool<H> {
    readers: parking_lot::Mutex<VecDeque<H>>,
    reader_semaphore: Semaphore,
    writer: Mutex<H>,
}

impl<H> DatabasePool<H> {
    pub fn new(writer: H, readers: Vec<H>) -> Self {
        let n = readers.len();
        Self {
            readers: parking_lot::Mutex::new(readers.into_iter().collect()),
            reader_semaphore: Semaphore::new(n),
            writer: Mutex::new(writer),
        }
    }

    /// Blocks until a reader handle is available.
    pub async fn borrow(&self) -> ReadGuard<'_, H> {
        let permit = self
            .reader_semaphore
            .acquire()
            .await
            .expect("reader semaphore is never closed");
        let handle = self
            .readers
            .lock()
            .pop_front()
            .expect("a semaphore permit guarantees a handle is queued");
        ReadGuard { pool: self, handle: Some(handle), _permit: permit }
    }

    /// Blocks until the single writer handle is available.
    pub async fn borrow_writeable(&self) -> WriteGuard<'_, H> {
        WriteGuard { guard: self.writer.lock().await }
    }

    pub fn available_readers(&self) -> usize {
        self.reader_semaphore.available_permits()
    }
}

pub struct ReadGuard<'a, H> {
    pool: &'a DatabasePool<H>,
    handle: Option<H>,
    _permit: SemaphorePermit<'a>,
}

impl<H> std::ops::Deref for ReadGuard<'_, H> {
    type Target = H;
    fn deref(&self) -> &H {
        self.handle.as_ref().expect("handle present until drop")
    }
}

impl<H> Drop for ReadGuard<'_, H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.readers.lock().push_back(handle);
        }
    }
}

pub struct WriteGuard<'a, H> {
    guard: MutexGuard<'a, H>,
}

impl<H> std::ops::Deref for WriteGuard<'_, H> {
    type Target = H;
    fn deref(&self) -> &H {
        &self.guard
    }
}

impl<H> std::ops::DerefMut for WriteGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn borrow_blocks_until_a_reader_frees_up() {
        let pool = Arc::new(DatabasePool::new(0usize, vec![1usize]));

        let guard1 = pool.borrow().await;
        assert_eq!(*guard1, 1);
        assert_eq!(pool.available_readers(), 0);

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move {
            let g = pool2.borrow().await;
            *g
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard1);
        let value = waiter.await.unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn writer_is_exclusive() {
        let pool = DatabasePool::new("writer".to_string(), vec!["reader".to_string()]);
        let w = pool.borrow_writeable().await;
        assert_eq!(*w, "writer");
        drop(w);

        let mut w2 = pool.borrow_writeable().await;
        w2.push_str("-used");
        assert_eq!(*w2, "writer-used");
    }
}
