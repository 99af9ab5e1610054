use crate::error::{LiteCoreError, Result};
use std::collections::BTreeMap;

/// Opaque 64-bit peer identifier, plus the well-known zero value meaning
/// "this local peer" (spec.md §3, `kMePeerID` in the original source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u64);

impl PeerId {
    pub const LOCAL: PeerId = PeerId(0);

    pub fn is_local(self) -> bool {
        self == PeerId::LOCAL
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Version-form revision ID: a (timestamp, peer) pair, written
/// `<hex-timestamp>@<hex-peerID>` (spec.md §3/§4.1). `timestamp_ns` is
/// nanoseconds since the Unix epoch; zero is invalid (never assigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionId {
    pub timestamp_ns: u64,
    pub peer: PeerId,
}

impl VersionId {
    pub fn new(timestamp_ns: u64, peer: PeerId) -> Result<Self> {
        if timestamp_ns == 0 {
            return Err(LiteCoreError::BadRevisionId("zero timestamp is invalid".into()));
        }
        Ok(Self { timestamp_ns, peer })
    }

    /// `allow_local_abbreviation` controls whether `*` is accepted in the
    /// peer position (true for local-storage parsing, false for wire
    /// parsing — spec.md §6 never transmits `*`).
    pub fn parse(s: &str, allow_local_abbreviation: bool) -> Result<Self> {
        let (ts_part, peer_part) = s
            .split_once('@')
            .ok_or_else(|| LiteCoreError::BadRevisionId(format!("not a version-form revision ID: {s:?}")))?;

        let timestamp_ns = u64::from_str_radix(ts_part, 16)
            .map_err(|_| LiteCoreError::BadRevisionId(format!("bad timestamp in {s:?}")))?;

        let peer = if peer_part == "*" {
            if !allow_local_abbreviation {
                return Err(LiteCoreError::BadRevisionId(
                    "the `*` local-peer abbreviation may not appear in wire-encoded revision IDs".into(),
                ));
            }
            PeerId::LOCAL
        } else {
            let id = u64::from_str_radix(peer_part, 16)
                .map_err(|_| LiteCoreError::BadRevisionId(format!("bad peer ID in {s:?}")))?;
            PeerId(id)
        };

        VersionId::new(timestamp_ns, peer)
    }

    /// `local_peer`: `Some(id)` substitutes the local peer's real ID for
    /// `PeerId::LOCAL` and never emits `*` (used when sharing with a peer);
    /// `None` abbreviates a local author as `*` (local-storage form).
    pub fn format(&self, local_peer: Option<PeerId>) -> String {
        let peer = match local_peer {
            Some(real) if self.peer.is_local() => {
                return format!("{:x}@{:x}", self.timestamp_ns, real.0);
            }
            _ => self.peer,
        };
        if local_peer.is_none() && peer.is_local() {
            format!("{:x}@*", self.timestamp_ns)
        } else {
            format!("{:x}@{:x}", self.timestamp_ns, peer.0)
        }
    }
}

/// An ordered map from peer to the latest timestamp that peer wrote, per
/// spec.md §3: "a document using version IDs carries an ordered version
/// vector whose head is the current version." Compared element-wise
/// (spec.md §4.1) to yield `Same`/`Older`/`Newer`/`Conflicting`.
///
/// Shaped after the teacher's `replication::sync::VersionVector`
/// (`HashMap<String, u64>` + `get`/`update`/`merge`), keyed here by
/// [`PeerId`] instead of a string node name and ordered so the head is
/// always the most-recently-written entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionVector {
    entries: BTreeMap<PeerId, u64>,
    /// Peer that wrote the current (head) version, i.e. the most recent.
    head: Option<PeerId>,
}

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, peer: PeerId) -> u64 {
        *self.entries.get(&peer).unwrap_or(&0)
    }

    /// Records that `peer` wrote at `timestamp_ns`; becomes the new head if
    /// it's the most recent write seen so far.
    pub fn record(&mut self, peer: PeerId, timestamp_ns: u64) {
        let current = self.entries.entry(peer).or_insert(0);
        if timestamp_ns > *current {
            *current = timestamp_ns;
        }
        let is_new_head = match self.head {
            Some(h) => timestamp_ns >= self.get(h),
            None => true,
        };
        if is_new_head {
            self.head = Some(peer);
        }
    }

    /// The current version (the head entry), if any.
    pub fn current(&self) -> Option<VersionId> {
        self.head.map(|p| VersionId { timestamp_ns: self.get(p), peer: p })
    }

    pub fn merge(&mut self, other: &VersionVector) {
        for (&peer, &ts) in &other.entries {
            self.record(peer, ts);
        }
    }

    /// Element-wise comparison against `other` (spec.md §4.1).
    pub fn compare_to(&self, other: &VersionVector) -> super::VersionOrder {
        use super::VersionOrder::*;

        let mut any_greater = false;
        let mut any_lesser = false;
        let mut peers: std::collections::BTreeSet<PeerId> = self.entries.keys().copied().collect();
        peers.extend(other.entries.keys().copied());

        for peer in peers {
            let a = self.get(peer);
            let b = other.get(peer);
            match a.cmp(&b) {
                std::cmp::Ordering::Greater => any_greater = true,
                std::cmp::Ordering::Less => any_lesser = true,
                std::cmp::Ordering::Equal => {}
            }
        }

        match (any_greater, any_lesser) {
            (false, false) => Same,
            (true, false) => Newer,
            (false, true) => Older,
            (true, true) => Conflicting,
        }
    }

    /// Serialized form: versions joined by `,` in most-recent-first order
    /// (spec.md §6).
    pub fn format(&self, local_peer: Option<PeerId>) -> String {
        let mut entries: Vec<(PeerId, u64)> = self.entries.iter().map(|(&p, &t)| (p, t)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
            .into_iter()
            .map(|(peer, ts)| VersionId { timestamp_ns: ts, peer }.format(local_peer))
            .collect::<Vec<_>>()
            .join(",")
    }
}
