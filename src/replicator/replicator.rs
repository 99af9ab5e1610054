//! The top-level Replicator actor: drives the connection state machine,
//! the retry policy, the Pusher/Puller halves, and the Checkpointer behind
//! one serial mailbox, and exposes the user-visible status (spec.md §4.5,
//! §7).
//!
//! Grounded on `original_source/Replicator/Replicator.{cc,hh}` for the
//! state-machine wiring and on the teacher's `ReplicationAgent` for the
//! actor-around-a-connection shape: one mailbox owns the connection, and
//! external callers only ever talk to it through messages.

use super::message::{Message, MessageKind, MessageNumbering, Profile};
use super::pusher::{ChangeReplyRow, ChangeRow, Pusher};
use super::puller::Puller;
use super::retry::RetryPolicy;
use super::state_machine::{ConnectionEvent, ConnectionState};
use super::transport::{CloseInfo, Frame, TransportEvent, WebSocketTransport};
use crate::checkpoint::Checkpointer;
use crate::collection::{CollectionStore, IndexDelegate, NullIndexDelegate};
use crate::error::LiteCoreError;
use crate::storage::KeyValueStore;
use crate::support::actor::{spawn_actor, Actor, ActorHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// `level` of the user-visible status (spec.md §7); a coarser view of
/// [`ConnectionState`] collapsing `Stopping` into `Busy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityLevel {
    Stopped,
    Offline,
    Connecting,
    Idle,
    Busy,
}

impl From<ConnectionState> for ActivityLevel {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Stopped => ActivityLevel::Stopped,
            ConnectionState::Offline => ActivityLevel::Offline,
            ConnectionState::Connecting => ActivityLevel::Connecting,
            ConnectionState::Idle => ActivityLevel::Idle,
            ConnectionState::Busy | ConnectionState::Stopping => ActivityLevel::Busy,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub units_completed: u64,
    pub units_total: u64,
    pub docs_completed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub host_reachable: bool,
    pub suspended: bool,
    pub will_retry: bool,
}

/// `{level, progress, error, flags}` (spec.md §7).
#[derive(Debug, Clone, Default)]
pub struct ReplicatorStatus {
    pub level: ActivityLevel,
    pub progress: Progress,
    pub error: Option<String>,
    pub flags: StatusFlags,
}

impl Default for ActivityLevel {
    fn default() -> Self {
        ActivityLevel::Stopped
    }
}

/// Opens the transport a Replicator talks over. Real code implements this
/// against [`super::transport::TungsteniteTransport::connect`]; tests hand
/// in one half of a [`super::transport::LoopbackTransport::pair`].
#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn connect(&self) -> crate::error::Result<(Box<dyn WebSocketTransport>, mpsc::Receiver<TransportEvent>)>;
}

/// Messages accepted by the Replicator actor's mailbox.
pub enum ReplicatorMessage {
    BindSelf(ActorHandle<ReplicatorMessage>),
    Start,
    Stop,
    Suspend,
    Transport(TransportEvent),
    RetryTimerFired,
    AutosaveTimerFired,
}

/// Owns a connection's worth of replication state. Generic over the backing
/// store the same way [`CollectionStore`] is.
pub struct Replicator<S: KeyValueStore + Send + 'static, D: IndexDelegate + Send + 'static = NullIndexDelegate> {
    store: CollectionStore<S, D>,
    checkpointer: Checkpointer,
    pusher: Pusher,
    puller: Puller,
    retry: RetryPolicy,
    state: ConnectionState,
    numbering: MessageNumbering,
    factory: Arc<dyn SocketFactory>,
    transport: Option<Box<dyn WebSocketTransport>>,
    configured_collections: Vec<String>,
    status: Arc<Mutex<ReplicatorStatus>>,
    self_handle: Option<ActorHandle<ReplicatorMessage>>,
    autosave_delay: std::time::Duration,
    autosave_armed: bool,
}

impl<S: KeyValueStore + Send + 'static, D: IndexDelegate + Send + 'static> Replicator<S, D> {
    pub fn new(
        store: CollectionStore<S, D>,
        checkpointer: Checkpointer,
        collection_name: impl Into<String>,
        continuous: bool,
        factory: Arc<dyn SocketFactory>,
        autosave_delay: std::time::Duration,
    ) -> Self {
        let collection_name = collection_name.into();
        Self {
            store,
            checkpointer,
            pusher: Pusher::new(collection_name.clone()),
            puller: Puller::new(collection_name.clone()),
            retry: RetryPolicy::new(!continuous),
            state: ConnectionState::Stopped,
            numbering: MessageNumbering::default(),
            factory,
            transport: None,
            configured_collections: vec![collection_name],
            status: Arc::new(Mutex::new(ReplicatorStatus::default())),
            self_handle: None,
            autosave_delay,
            autosave_armed: false,
        }
    }

    /// Spawns the actor and returns a handle plus a cheaply-cloneable
    /// read-only view of its status.
    pub fn spawn(replicator: Self) -> (ActorHandle<ReplicatorMessage>, Arc<Mutex<ReplicatorStatus>>) {
        let status = replicator.status.clone();
        let handle = spawn_actor(replicator, 256);
        handle.try_send(ReplicatorMessage::BindSelf(handle.clone()));
        (handle, status)
    }

    fn set_state(&mut self, to: ConnectionState) {
        self.state = to;
        let mut status = self.status.lock();
        status.level = ActivityLevel::from(to);
        status.flags.will_retry = to == ConnectionState::Offline;
        status.flags.suspended = to == ConnectionState::Stopping;
    }

    fn apply(&mut self, event: ConnectionEvent) {
        let transition = self.state.transition(event);
        if transition.reset_retry_count {
            self.retry.reset();
        }
        self.set_state(transition.to);
        if transition.arm_retry_timer {
            self.arm_retry_timer();
        }
    }

    fn arm_retry_timer(&mut self) {
        if !self.retry.should_retry() {
            self.apply(ConnectionEvent::ErrorFatal);
            return;
        }
        let delay = self.retry.next_delay();
        if let Some(handle) = self.self_handle.clone() {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                handle.send(ReplicatorMessage::RetryTimerFired).await;
            });
        }
    }

    /// Arms the autosave timer if the checkpoint is dirty and no timer is
    /// already in flight (spec.md §4.4 "the first mutation arms a timer").
    fn maybe_arm_autosave(&mut self) {
        if self.autosave_armed || !self.checkpointer.needs_save() {
            return;
        }
        self.autosave_armed = true;
        let delay = self.autosave_delay;
        if let Some(handle) = self.self_handle.clone() {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                handle.send(ReplicatorMessage::AutosaveTimerFired).await;
            });
        }
    }

    /// The autosave timer's fire handler: runs the save callback and
    /// re-arms immediately if mutations arrived while it was in flight
    /// (spec.md §4.4 `_overdueForSave`/`saveCompleted`).
    fn perform_autosave(&mut self) {
        self.autosave_armed = false;
        match self.checkpointer.save(&mut self.store) {
            Ok(true) => self.maybe_arm_autosave(),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "checkpoint autosave failed"),
        }
    }

    async fn open_connection(&mut self) {
        match self.factory.connect().await {
            Ok((transport, mut events)) => {
                self.transport = Some(transport);
                self.status.lock().flags.host_reachable = true;
                if let Some(handle) = self.self_handle.clone() {
                    tokio::spawn(async move {
                        while let Some(event) = events.recv().await {
                            if !handle.send(ReplicatorMessage::Transport(event)).await {
                                break;
                            }
                        }
                    });
                }
            }
            Err(e) => {
                self.status.lock().error = Some(e.to_string());
                if e.is_transient() {
                    self.apply(ConnectionEvent::ConnectFailedRetryable);
                } else {
                    self.apply(ConnectionEvent::ConnectFailedFatal);
                }
            }
        }
    }

    async fn on_connected(&mut self) {
        self.apply(ConnectionEvent::WebSocketUpgraded);
        self.send_pending_changes().await;
    }

    async fn send_pending_changes(&mut self) {
        let configured = self.configured_collections.clone();
        let rows = match self.pusher.pending_changes(&self.store, &self.checkpointer, &configured) {
            Ok(rows) => rows,
            Err(_) => return,
        };
        if rows.is_empty() {
            return;
        }
        self.status.lock().progress.units_total += rows.len() as u64;
        self.apply(ConnectionEvent::LocalChangeOrIncomingMessage);
        if let Some(transport) = self.transport.as_mut() {
            let number = self.numbering.next();
            if let Ok(msg) = Pusher::build_changes_message(number, &rows) {
                if let Ok(encoded) = msg.encode() {
                    let _ = transport.send(Frame(encoded)).await;
                }
            }
        }
        for row in &rows {
            if let Ok(seq) = row.sequence.try_into() {
                self.checkpointer.add_pending_sequence(seq);
            }
        }
        self.maybe_arm_autosave();
        self.apply(ConnectionEvent::QueueDrained);
    }

    async fn on_frame(&mut self, frame: Frame) {
        let Ok(msg) = Message::decode(&frame.0) else { return };
        match (msg.kind, msg.profile) {
            (MessageKind::Response, Profile::Changes) => self.on_changes_reply(&msg).await,
            (MessageKind::Request, Profile::Rev) => self.on_rev(&msg).await,
            _ => {}
        }
        self.apply(ConnectionEvent::QueueDrained);
    }

    async fn on_changes_reply(&mut self, msg: &Message) {
        let Ok(rows) = serde_json::from_value::<Vec<ChangeReplyRow>>(msg.properties.clone()) else { return };
        let completed = rows.iter().filter(|r| !r.body_needed).count();
        self.status.lock().progress.docs_completed += completed as u64;
    }

    async fn on_rev(&mut self, msg: &Message) {
        let Some(doc_id) = msg.properties.get("id").and_then(|v| v.as_str()) else { return };
        let Some(history_value) = msg.properties.get("history").and_then(|v| v.as_array()) else { return };
        let history: Vec<crate::revid::RevId> = history_value
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| crate::revid::RevId::parse_wire(s).ok())
            .collect();
        if history.is_empty() {
            return;
        }
        let body = serde_json::from_slice(&msg.body).ok();
        let result = self.puller.apply_revision(&mut self.store, doc_id, body, history, true);
        if let Ok((doc, _)) = result {
            self.checkpointer.completed_sequence(doc.sequence);
            self.status.lock().progress.docs_completed += 1;
            self.maybe_arm_autosave();
        }
    }

    async fn on_transport_closed(&mut self, info: CloseInfo) {
        let err = LiteCoreError::WebSocketStatus { code: info.code, message: info.reason.clone() };
        self.status.lock().error = Some(err.to_string());
        let event = if err.is_transient() {
            match self.state {
                ConnectionState::Connecting => ConnectionEvent::ConnectFailedRetryable,
                ConnectionState::Stopping => ConnectionEvent::SocketClosedRetryable,
                _ => ConnectionEvent::ErrorRetryable,
            }
        } else if self.state == ConnectionState::Stopping {
            ConnectionEvent::SocketClosedCleanly
        } else if self.state == ConnectionState::Connecting {
            ConnectionEvent::ConnectFailedFatal
        } else {
            ConnectionEvent::ErrorFatal
        };
        self.apply(event);
    }
}

#[async_trait]
impl<S: KeyValueStore + Send + 'static, D: IndexDelegate + Send + 'static> Actor for Replicator<S, D> {
    type Message = ReplicatorMessage;

    async fn handle(&mut self, msg: ReplicatorMessage) {
        match msg {
            ReplicatorMessage::BindSelf(handle) => self.self_handle = Some(handle),
            ReplicatorMessage::Start => {
                if self.state == ConnectionState::Stopped {
                    self.apply(ConnectionEvent::Start);
                    self.open_connection().await;
                }
            }
            ReplicatorMessage::Stop => {
                self.status.lock().flags.will_retry = false;
                if matches!(self.state, ConnectionState::Idle) {
                    self.apply(ConnectionEvent::Stop);
                }
                if let Some(transport) = self.transport.as_mut() {
                    let _ = transport.close(1000, "replicator stopped").await;
                }
            }
            ReplicatorMessage::Suspend => {
                self.status.lock().flags.suspended = true;
                if matches!(self.state, ConnectionState::Idle) {
                    self.apply(ConnectionEvent::Suspend);
                }
            }
            ReplicatorMessage::Transport(event) => match event {
                TransportEvent::Connected => self.on_connected().await,
                TransportEvent::Frame(frame) => self.on_frame(frame).await,
                TransportEvent::PeerRequestedClose(info) | TransportEvent::Closed(info) => {
                    self.on_transport_closed(info).await
                }
                TransportEvent::Writeable => {}
            },
            ReplicatorMessage::RetryTimerFired => {
                self.apply(ConnectionEvent::RetryTimerFired);
                self.open_connection().await;
            }
            ReplicatorMessage::AutosaveTimerFired => self.perform_autosave(),
        }
    }
}
