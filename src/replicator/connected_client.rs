//! Connected-client mode: a thin client that issues one-off `getRev`/`putRev`
//! requests against a passive peer instead of running a full Pusher/Puller
//! change-feed loop (spec.md §4.5's profile table entries for `getRev` and
//! `putRev`; SPEC_FULL.md §4.5 `[ADD]`).
//!
//! Grounded on
//! `examples/original_source/Replicator/ConnectedClient/ConnectedClient.cc`;
//! shares the same [`Message`]/[`Profile`] wire layer the full Replicator
//! uses, addressed through the same [`WebSocketTransport`].

use super::message::{Message, MessageKind, MessageNumbering, Profile};
use super::transport::{Frame, WebSocketTransport};
use crate::doc::Document;
use crate::error::{LiteCoreError, Result};
use crate::revid::RevId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// A single revision fetched via `getRev`: its ID and body, without the
/// surrounding document metadata a full pull would reconstruct.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRevision {
    pub rev_id: RevId,
    pub body: serde_json::Value,
    pub deleted: bool,
}

/// A thin client issuing correlated request/response pairs over one
/// transport, without owning a Checkpointer or Sequence Tracker — the
/// caller decides what to do with fetched/pushed revisions.
///
/// Cloning shares the same pending-request table and request-numbering
/// counter, so one clone can drive `on_frame` from a transport-reading task
/// while another clone issues requests and awaits their replies.
#[derive(Clone)]
pub struct ConnectedClient {
    numbering: Arc<MessageNumbering>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Message>>>>,
}

impl Default for ConnectedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectedClient {
    pub fn new() -> Self {
        Self { numbering: Arc::new(MessageNumbering::default()), pending: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Routes an incoming frame to whichever pending request it correlates
    /// with, by message number. Unsolicited frames (number has no pending
    /// waiter) are dropped; the full Replicator's own `on_frame` handles
    /// server-initiated traffic.
    pub fn on_frame(&self, frame: &Frame) -> Result<()> {
        let msg = Message::decode(&frame.0)?;
        if let Some(waiter) = self.pending.lock().remove(&msg.number) {
            let _ = waiter.send(msg);
        }
        Ok(())
    }

    fn register(&self, number: u64) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(number, tx);
        rx
    }

    /// Sends a `getRev` request for `doc_id` (optionally a specific
    /// `rev_id`; `None` means "current") and awaits the reply.
    pub async fn get_rev(
        &self,
        transport: &mut dyn WebSocketTransport,
        doc_id: &str,
        rev_id: Option<&RevId>,
    ) -> Result<FetchedRevision> {
        let number = self.numbering.next();
        let mut properties = serde_json::json!({ "id": doc_id });
        if let Some(rev) = rev_id {
            properties["rev"] = serde_json::Value::String(rev.format());
        }
        let request = Message::request(number, Profile::GetRev, properties);
        let rx = self.register(number);
        transport.send(Frame(request.encode()?)).await?;

        let response = rx.await.map_err(|_| LiteCoreError::NotFound)?;
        let rev_id_str =
            response.properties.get("rev").and_then(|v| v.as_str()).ok_or(LiteCoreError::CorruptRevisionData(
                "getRev response missing rev".into(),
            ))?;
        let deleted = response.properties.get("deleted").and_then(|v| v.as_bool()).unwrap_or(false);
        let body: serde_json::Value =
            if response.body.is_empty() { serde_json::Value::Null } else { serde_json::from_slice(&response.body)? };
        Ok(FetchedRevision { rev_id: RevId::parse_wire(rev_id_str)?, body, deleted })
    }

    /// Sends a `putRev` request carrying `doc.current_rev_id`'s body and
    /// awaits the peer's acknowledgment (an error response surfaces as
    /// [`LiteCoreError::Conflict`] when the peer rejects it as not a
    /// descendant of its current revision).
    pub async fn put_rev(&self, transport: &mut dyn WebSocketTransport, doc: &Document) -> Result<()> {
        let number = self.numbering.next();
        let properties = serde_json::json!({
            "id": doc.doc_id,
            "rev": doc.current_rev_id.format(),
            "deleted": doc.flags.contains(crate::doc::DocumentFlags::DELETED),
        });
        let body = doc.body.as_ref().map(|b| serde_json::to_vec(b)).transpose()?.unwrap_or_default();
        let request = Message::request_with_body(number, Profile::PutRev, properties, body);
        let rx = self.register(number);
        transport.send(Frame(request.encode()?)).await?;

        let response = rx.await.map_err(|_| LiteCoreError::NotFound)?;
        if response.kind == MessageKind::Error {
            return Err(LiteCoreError::Conflict);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replicator::transport::{LoopbackTransport, TransportEvent};

    #[tokio::test]
    async fn get_rev_round_trips_against_a_loopback_peer() {
        let ((mut client_side, mut client_rx), (mut peer_side, mut peer_rx)) = LoopbackTransport::pair();
        let client = ConnectedClient::new();

        let reader_client = client.clone();
        tokio::spawn(async move {
            while let Some(event) = client_rx.recv().await {
                if let TransportEvent::Frame(frame) = event {
                    let _ = reader_client.on_frame(&frame);
                }
            }
        });

        let requester = client.clone();
        let get = tokio::spawn(async move { requester.get_rev(&mut client_side, "doc1", None).await });

        let frame = loop {
            match peer_rx.recv().await.unwrap() {
                TransportEvent::Frame(f) => break f,
                _ => continue,
            }
        };
        let request = Message::decode(&frame.0).unwrap();
        assert_eq!(request.profile, Profile::GetRev);
        assert_eq!(request.properties["id"], "doc1");

        let response = Message::response_with_body(
            &request,
            serde_json::json!({ "rev": "1-abc", "deleted": false }),
            serde_json::to_vec(&serde_json::json!({"n": 1})).unwrap(),
        );
        peer_side.send(Frame(response.encode().unwrap())).await.unwrap();

        let fetched = get.await.unwrap().unwrap();
        assert_eq!(fetched.rev_id, RevId::parse_wire("1-abc").unwrap());
        assert_eq!(fetched.body, serde_json::json!({"n": 1}));
        assert!(!fetched.deleted);
    }

    #[tokio::test]
    async fn put_rev_surfaces_a_peer_conflict_as_an_error() {
        let ((mut client_side, mut client_rx), (mut peer_side, mut peer_rx)) = LoopbackTransport::pair();
        let client = ConnectedClient::new();

        let reader_client = client.clone();
        tokio::spawn(async move {
            while let Some(event) = client_rx.recv().await {
                if let TransportEvent::Frame(frame) = event {
                    let _ = reader_client.on_frame(&frame);
                }
            }
        });

        let doc = Document::new(
            "a".to_string(),
            RevId::parse("2-bb").unwrap(),
            Some(serde_json::json!({"n": 2})),
            crate::doc::DocumentFlags::EXISTS,
        );

        let requester = client.clone();
        let put = tokio::spawn(async move { requester.put_rev(&mut client_side, &doc).await });

        let frame = loop {
            match peer_rx.recv().await.unwrap() {
                TransportEvent::Frame(f) => break f,
                _ => continue,
            }
        };
        let request = Message::decode(&frame.0).unwrap();
        assert_eq!(request.profile, Profile::PutRev);

        let error_response = Message::error_response(&request, 409, "conflict");
        peer_side.send(Frame(error_response.encode().unwrap())).await.unwrap();

        let result = put.await.unwrap();
        assert!(matches!(result, Err(LiteCoreError::Conflict)));
    }
}
