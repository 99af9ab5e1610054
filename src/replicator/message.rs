//! The replicator's message layer: a request/response protocol over a
//! bidirectional byte-stream transport, addressed by the profiles in
//! spec.md §4.5's table.

use crate::error::{LiteCoreError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Message profiles exchanged between peers (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Profile {
    GetCheckpoint,
    SetCheckpoint,
    SubChanges,
    Changes,
    Rev,
    GetRev,
    PutRev,
    GetAttachment,
    ProveAttachment,
}

/// Whether a message is a request awaiting a reply, or a reply/one-way
/// notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Request,
    Response,
    Error,
}

/// One frame on the wire. Requests carry an incrementing `number`; replies
/// reuse the request's number so the sender can correlate them (spec.md
/// §4.5 "each request has an integer number; the reply re-uses it").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub number: u64,
    pub kind: MessageKind,
    pub profile: Profile,
    pub properties: serde_json::Value,
    #[serde(with = "serde_bytes_body", default)]
    pub body: Vec<u8>,
}

mod serde_bytes_body {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        use base64::Engine;
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

use base64::Engine as _;

impl Message {
    pub fn request(number: u64, profile: Profile, properties: serde_json::Value) -> Self {
        Self { number, kind: MessageKind::Request, profile, properties, body: Vec::new() }
    }

    pub fn request_with_body(number: u64, profile: Profile, properties: serde_json::Value, body: Vec<u8>) -> Self {
        Self { number, kind: MessageKind::Request, profile, properties, body }
    }

    pub fn response(to: &Message, properties: serde_json::Value) -> Self {
        Self { number: to.number, kind: MessageKind::Response, profile: to.profile, properties, body: Vec::new() }
    }

    pub fn response_with_body(to: &Message, properties: serde_json::Value, body: Vec<u8>) -> Self {
        Self { number: to.number, kind: MessageKind::Response, profile: to.profile, properties, body }
    }

    pub fn error_response(to: &Message, code: u16, message: &str) -> Self {
        Self {
            number: to.number,
            kind: MessageKind::Error,
            profile: to.profile,
            properties: serde_json::json!({ "code": code, "message": message }),
            body: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| LiteCoreError::Other(anyhow::anyhow!(e)))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| LiteCoreError::Other(anyhow::anyhow!(e)))
    }
}

/// Hands out monotonically increasing request numbers for one connection.
#[derive(Debug, Default)]
pub struct MessageNumbering {
    next: AtomicU64,
}

impl MessageNumbering {
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}
