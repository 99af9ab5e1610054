//! Replicator: drives an active or passive replication of one or more
//! collections over a single bidirectional message stream (spec.md §4.5).
//!
//! Grounded on `examples/original_source/Replicator/*` and
//! `C/Cpp_include/c4Replicator.hh` for the state machine, retry policy and
//! message profile table; the actor/backoff shape follows the teacher's
//! `replication::agent::ReplicationAgent` and
//! `infrastructure::circuit_breaker`.

mod connected_client;
mod flow_control;
mod message;
mod puller;
mod pusher;
#[allow(clippy::module_inception)]
mod replicator;
mod retry;
mod state_machine;
mod transport;

pub use connected_client::{ConnectedClient, FetchedRevision};
pub use flow_control::{FlowControl, SEND_BUFFER_SIZE};
pub use message::{Message, MessageKind, MessageNumbering, Profile};
pub use puller::Puller;
pub use pusher::{ChangeReplyRow, ChangeRow, Pusher};
pub use replicator::{
    ActivityLevel, Progress, Replicator, ReplicatorMessage, ReplicatorStatus, SocketFactory, StatusFlags,
};
pub use retry::{backoff_delay, RetryPolicy, MAX_ONE_SHOT_RETRY_COUNT};
pub use state_machine::{ConnectionEvent, ConnectionState, Transition};
pub use transport::{CloseInfo, Frame, LoopbackTransport, TransportEvent, TungsteniteTransport, WebSocketTransport};
