//! Shared data model: endpoint ids, request/response metadata, progress info.

use bytes::Bytes;
use rand::Rng;

use crate::listener::ConnectionListener;
use crate::medium::Medium;
use crate::payload::PayloadId;

/// Length of a hardware (MAC) address.
pub const MAC_ADDRESS_LENGTH: usize = 6;

/// Length of an endpoint id, in bytes.
pub const ENDPOINT_ID_LENGTH: usize = 4;

/// Upper bound for advertised endpoint info.
pub const MAX_ENDPOINT_INFO_LENGTH: usize = 131;

const ENDPOINT_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Short opaque token identifying one remote device for the duration of a
/// discovery/connection cycle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random id of [`ENDPOINT_ID_LENGTH`] characters from `[A-Z0-9]`.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..ENDPOINT_ID_LENGTH)
            .map(|_| ENDPOINT_ID_ALPHABET[rng.gen_range(0..ENDPOINT_ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Metadata supplied with an advertisement or an outgoing connection request.
#[derive(Clone, Debug)]
pub struct ConnectionRequestInfo {
    /// Endpoint display info (bounded by [`MAX_ENDPOINT_INFO_LENGTH`])
    pub endpoint_info: Bytes,
    /// Receives initiated/accepted/rejected/disconnected/bandwidth events
    pub listener: ConnectionListener,
}

/// Information reported when a connection is initiated in either direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionResponseInfo {
    pub remote_endpoint_info: Bytes,
    /// Short human-comparable token
    pub authentication_token: String,
    pub raw_authentication_token: Bytes,
    pub is_incoming_connection: bool,
    pub is_connection_verified: bool,
}

/// Endpoint learned out of band and injected into an active discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutOfBandConnectionMetadata {
    /// Only [`Medium::Bluetooth`] is accepted
    pub medium: Medium,
    pub remote_bluetooth_mac_address: Bytes,
    pub endpoint_id: EndpointId,
    pub endpoint_info: Bytes,
}

/// Coarse distance of a discovered endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DistanceInfo {
    Unknown,
    VeryClose,
    Close,
    Far,
}

/// Transfer status carried by progress updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadStatus {
    Success,
    Failure,
    InProgress,
    Canceled,
}

/// Out-of-band progress report for one payload on one endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadProgressInfo {
    pub payload_id: PayloadId,
    pub status: PayloadStatus,
    pub total_bytes: i64,
    pub bytes_transferred: i64,
}
