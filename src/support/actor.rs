//! A bounded, serial "actor" runtime.
//!
//! Generalizes the ad hoc `mpsc::channel` + background-task pattern the
//! teacher crate repeats in `ReplicationAgent`, `SyncService` and
//! `TransportService`: messages on one actor's queue run strictly serially,
//! never re-entrant, FIFO. `Replicator`, `Pusher`, `Puller`, observer
//! notification sinks, and the checkpoint autosave timer are all built on
//! this one runtime (spec.md §5).

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// An actor processes messages of one type, one at a time, in order.
#[async_trait::async_trait]
pub trait Actor: Send + 'static {
    type Message: Send + 'static;

    async fn handle(&mut self, msg: Self::Message);

    /// Runs once the mailbox is closed and fully drained. Used for final
    /// close events (e.g. the Replicator's last status update).
    async fn on_stop(&mut self) {}
}

/// A handle to a running actor's mailbox.
///
/// Cloning is cheap (it's just another sender); dropping every clone closes
/// the mailbox and lets the actor's task exit after draining.
pub struct ActorHandle<M: Send + 'static> {
    sender: Arc<Mutex<Option<mpsc::Sender<M>>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

/// Clones share the same mailbox (closing one closes all); only the
/// original returned by [`spawn_actor`] can `join()` the task.
impl<M: Send + 'static> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone(), join: Mutex::new(None) }
    }
}

impl<M: Send + 'static> ActorHandle<M> {
    /// Enqueue a message, waiting if the mailbox is full. Returns `false`
    /// if the actor has already been stopped.
    pub async fn send(&self, msg: M) -> bool {
        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) => sender.send(msg).await.is_ok(),
            None => false,
        }
    }

    /// Enqueue a message without waiting; returns `false` if the mailbox is
    /// full or already closed.
    pub fn try_send(&self, msg: M) -> bool {
        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) => sender.try_send(msg).is_ok(),
            None => false,
        }
    }

    /// Cooperative shutdown: closes the mailbox. Messages already queued are
    /// still delivered in order; no new ones are accepted after this call.
    /// The actor's `on_stop` runs once the queue drains.
    pub fn stop(&self) {
        self.sender.lock().take();
    }

    /// Waits for the actor's task to finish (queue drained + `on_stop` run).
    pub async fn join(&self) {
        let handle = self.join.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Spawns `actor` on its own task with a mailbox of `capacity` messages.
pub fn spawn_actor<A: Actor>(mut actor: A, capacity: usize) -> ActorHandle<A::Message> {
    let (tx, mut rx) = mpsc::channel::<A::Message>(capacity);
    let join = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            actor.handle(msg).await;
        }
        actor.on_stop().await;
    });
    ActorHandle {
        sender: Arc::new(Mutex::new(Some(tx))),
        join: Mutex::new(Some(join)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter {
        total: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Actor for Counter {
        type Message = usize;

        async fn handle(&mut self, msg: usize) {
            self.total.fetch_add(msg, Ordering::SeqCst);
        }

        async fn on_stop(&mut self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn messages_are_applied_in_order() {
        let total = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));
        let handle = spawn_actor(
            Counter { total: total.clone(), stopped: stopped.clone() },
            16,
        );

        for i in 1..=5 {
            assert!(handle.send(i).await);
        }
        handle.stop();
        handle.join().await;

        assert_eq!(total.load(Ordering::SeqCst), 15);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_clone_shares_the_same_mailbox() {
        let total = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));
        let handle = spawn_actor(Counter { total: total.clone(), stopped: stopped.clone() }, 16);
        let clone = handle.clone();

        assert!(clone.send(3).await);
        clone.stop();
        assert!(!handle.send(1).await, "stopping a clone must close the shared mailbox");
        handle.join().await;

        assert_eq!(total.load(Ordering::SeqCst), 3);
    }
}
