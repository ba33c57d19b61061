//! Per-client session state.
//!
//! [`ClientSession`] is the contract between the router, the transport
//! controller and whatever stores client state. The router only reads
//! through the query half and raises cancellation flags; controllers drive
//! the lifecycle hooks as radios report progress. [`SessionState`] is the
//! in-memory implementation.
//!
//! Every method takes `&self`: queries and the cancellation fast path are
//! called from arbitrary threads while the serializer mutates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, warn};

use crate::errors::Status;
use crate::listener::{
    ConnectionEvent, ConnectionListener, DiscoveryEvent, DiscoveryListener, PayloadEvent,
    PayloadListener,
};
use crate::medium::Medium;
use crate::payload::Payload;
use crate::types::{
    ConnectionRequestInfo, ConnectionResponseInfo, DistanceInfo, EndpointId, PayloadProgressInfo,
};

/// Shared handle to a client session.
pub type SessionHandle = Arc<dyn ClientSession>;

/// Level-triggered cancellation signal for one endpoint.
///
/// Clones share the same flag; once cancelled it stays cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Relation of the local client to one endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointRelation {
    NoRelation,
    PendingOutgoing,
    PendingIncoming,
    Connected,
}

/// Session contract.
pub trait ClientSession: Send + Sync {
    // ---------------------------------------------------------------------
    // Queries and cancellation (consumed by the router)
    // ---------------------------------------------------------------------

    fn client_id(&self) -> u64;

    /// Id this client presents to remote endpoints.
    fn local_endpoint_id(&self) -> EndpointId;

    fn is_advertising(&self) -> bool;

    fn is_discovering(&self) -> bool;

    fn is_listening_for_incoming_connections(&self) -> bool;

    fn is_connected_to_endpoint(&self, endpoint_id: &EndpointId) -> bool;

    /// Outgoing or incoming connection not yet fully accepted.
    fn has_pending_connection_to_endpoint(&self, endpoint_id: &EndpointId) -> bool;

    /// Whether the local side already accepted or rejected this endpoint.
    fn has_local_endpoint_responded(&self, endpoint_id: &EndpointId) -> bool;

    /// Register a cancellation flag unless one already exists.
    fn add_cancellation_flag(&self, endpoint_id: &EndpointId);

    fn cancellation_flag(&self, endpoint_id: &EndpointId) -> Option<CancellationFlag>;

    fn remove_cancellation_flag(&self, endpoint_id: &EndpointId);

    /// Raise the endpoint's flag, if one is registered.
    fn cancel_endpoint(&self, endpoint_id: &EndpointId);

    fn cancel_all_endpoints(&self);

    fn pending_connected_endpoints(&self) -> Vec<EndpointId>;

    fn connected_endpoints(&self) -> Vec<EndpointId>;

    /// Drop every flag, relation and listener.
    fn reset(&self);

    /// True if a raised flag is registered for the endpoint.
    fn is_endpoint_cancelled(&self, endpoint_id: &EndpointId) -> bool {
        self.cancellation_flag(endpoint_id)
            .is_some_and(|flag| flag.is_cancelled())
    }

    // ---------------------------------------------------------------------
    // Lifecycle hooks (driven by transport controllers)
    // ---------------------------------------------------------------------

    fn started_advertising(&self, service_id: &str, info: ConnectionRequestInfo);

    fn stopped_advertising(&self);

    fn started_discovery(&self, service_id: &str, listener: DiscoveryListener);

    fn stopped_discovery(&self);

    fn started_listening(&self, service_id: &str, listener: ConnectionListener);

    fn stopped_listening(&self);

    fn on_endpoint_found(&self, endpoint_id: &EndpointId, endpoint_info: Bytes, service_id: &str);

    fn on_endpoint_lost(&self, endpoint_id: &EndpointId);

    fn on_endpoint_distance_changed(&self, endpoint_id: &EndpointId, distance: DistanceInfo);

    /// A connection reached the accept/reject stage. `listener` is the
    /// requester's listener for outgoing connections; incoming connections
    /// pass `None` and report to the advertising or listening listener.
    fn on_connection_initiated(
        &self,
        endpoint_id: &EndpointId,
        info: ConnectionResponseInfo,
        listener: Option<ConnectionListener>,
    );

    fn local_endpoint_accepted(&self, endpoint_id: &EndpointId, listener: PayloadListener);

    fn local_endpoint_rejected(&self, endpoint_id: &EndpointId);

    /// Both sides accepted.
    fn on_connection_accepted(&self, endpoint_id: &EndpointId);

    fn on_connection_rejected(&self, endpoint_id: &EndpointId, status: Status);

    fn on_disconnected(&self, endpoint_id: &EndpointId);

    fn on_bandwidth_changed(&self, endpoint_id: &EndpointId, medium: Medium);

    fn on_payload(&self, endpoint_id: &EndpointId, payload: Payload);

    fn on_payload_progress(&self, endpoint_id: &EndpointId, info: PayloadProgressInfo);
}

struct Connection {
    relation: EndpointRelation,
    local_responded: bool,
    listener: ConnectionListener,
    payload_listener: Option<PayloadListener>,
}

struct Advertising {
    service_id: String,
    info: ConnectionRequestInfo,
}

struct Discovery {
    service_id: String,
    listener: DiscoveryListener,
}

struct Listening {
    service_id: String,
    listener: ConnectionListener,
}

/// In-memory [`ClientSession`].
pub struct SessionState {
    client_id: u64,
    local_endpoint_id: EndpointId,
    advertising: RwLock<Option<Advertising>>,
    discovery: RwLock<Option<Discovery>>,
    listening: RwLock<Option<Listening>>,
    connections: DashMap<EndpointId, Connection>,
    cancellation_flags: DashMap<EndpointId, CancellationFlag>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_client_id(rand::thread_rng().gen())
    }

    pub fn with_client_id(client_id: u64) -> Self {
        Self {
            client_id,
            local_endpoint_id: EndpointId::generate(),
            advertising: RwLock::new(None),
            discovery: RwLock::new(None),
            listening: RwLock::new(None),
            connections: DashMap::new(),
            cancellation_flags: DashMap::new(),
        }
    }

    /// New session behind a [`SessionHandle`].
    pub fn handle() -> SessionHandle {
        Arc::new(Self::new())
    }

    pub fn relation(&self, endpoint_id: &EndpointId) -> EndpointRelation {
        self.connections
            .get(endpoint_id)
            .map(|c| c.relation)
            .unwrap_or(EndpointRelation::NoRelation)
    }

    pub fn advertising_service_id(&self) -> Option<String> {
        self.advertising.read().as_ref().map(|a| a.service_id.clone())
    }

    pub fn discovery_service_id(&self) -> Option<String> {
        self.discovery.read().as_ref().map(|d| d.service_id.clone())
    }

    pub fn listening_service_id(&self) -> Option<String> {
        self.listening.read().as_ref().map(|l| l.service_id.clone())
    }

    fn connection_listener(&self, endpoint_id: &EndpointId) -> Option<ConnectionListener> {
        self.connections.get(endpoint_id).map(|c| c.listener.clone())
    }

    fn endpoints_where(&self, pred: impl Fn(&Connection) -> bool) -> Vec<EndpointId> {
        let mut out: Vec<EndpointId> = self
            .connections
            .iter()
            .filter(|entry| pred(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();
        out.sort();
        out
    }

    /// Remove the relation and its flag, returning the listener to notify.
    fn end_connection(&self, endpoint_id: &EndpointId) -> Option<ConnectionListener> {
        self.cancellation_flags.remove(endpoint_id);
        self.connections
            .remove(endpoint_id)
            .map(|(_, connection)| connection.listener)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession for SessionState {
    fn client_id(&self) -> u64 {
        self.client_id
    }

    fn local_endpoint_id(&self) -> EndpointId {
        self.local_endpoint_id.clone()
    }

    fn is_advertising(&self) -> bool {
        self.advertising.read().is_some()
    }

    fn is_discovering(&self) -> bool {
        self.discovery.read().is_some()
    }

    fn is_listening_for_incoming_connections(&self) -> bool {
        self.listening.read().is_some()
    }

    fn is_connected_to_endpoint(&self, endpoint_id: &EndpointId) -> bool {
        self.relation(endpoint_id) == EndpointRelation::Connected
    }

    fn has_pending_connection_to_endpoint(&self, endpoint_id: &EndpointId) -> bool {
        matches!(
            self.relation(endpoint_id),
            EndpointRelation::PendingOutgoing | EndpointRelation::PendingIncoming
        )
    }

    fn has_local_endpoint_responded(&self, endpoint_id: &EndpointId) -> bool {
        self.connections
            .get(endpoint_id)
            .is_some_and(|c| c.local_responded)
    }

    fn add_cancellation_flag(&self, endpoint_id: &EndpointId) {
        self.cancellation_flags
            .entry(endpoint_id.clone())
            .or_insert_with(CancellationFlag::new);
    }

    fn cancellation_flag(&self, endpoint_id: &EndpointId) -> Option<CancellationFlag> {
        self.cancellation_flags.get(endpoint_id).map(|f| f.clone())
    }

    fn remove_cancellation_flag(&self, endpoint_id: &EndpointId) {
        self.cancellation_flags.remove(endpoint_id);
    }

    fn cancel_endpoint(&self, endpoint_id: &EndpointId) {
        match self.cancellation_flags.get(endpoint_id) {
            Some(flag) => {
                debug!("client {} cancelling endpoint {}", self.client_id, endpoint_id);
                flag.cancel();
            }
            None => debug!(
                "client {} has no cancellation flag for endpoint {}",
                self.client_id, endpoint_id
            ),
        }
    }

    fn cancel_all_endpoints(&self) {
        for entry in self.cancellation_flags.iter() {
            entry.value().cancel();
        }
    }

    fn pending_connected_endpoints(&self) -> Vec<EndpointId> {
        self.endpoints_where(|c| c.relation != EndpointRelation::Connected)
    }

    fn connected_endpoints(&self) -> Vec<EndpointId> {
        self.endpoints_where(|c| c.relation == EndpointRelation::Connected)
    }

    fn reset(&self) {
        *self.advertising.write() = None;
        *self.discovery.write() = None;
        *self.listening.write() = None;
        self.connections.clear();
        self.cancellation_flags.clear();
    }

    fn started_advertising(&self, service_id: &str, info: ConnectionRequestInfo) {
        *self.advertising.write() = Some(Advertising {
            service_id: service_id.to_string(),
            info,
        });
    }

    fn stopped_advertising(&self) {
        *self.advertising.write() = None;
    }

    fn started_discovery(&self, service_id: &str, listener: DiscoveryListener) {
        *self.discovery.write() = Some(Discovery {
            service_id: service_id.to_string(),
            listener,
        });
    }

    fn stopped_discovery(&self) {
        *self.discovery.write() = None;
    }

    fn started_listening(&self, service_id: &str, listener: ConnectionListener) {
        *self.listening.write() = Some(Listening {
            service_id: service_id.to_string(),
            listener,
        });
    }

    fn stopped_listening(&self) {
        *self.listening.write() = None;
    }

    fn on_endpoint_found(&self, endpoint_id: &EndpointId, endpoint_info: Bytes, service_id: &str) {
        let listener = self.discovery.read().as_ref().map(|d| d.listener.clone());
        match listener {
            Some(listener) => listener.emit(DiscoveryEvent::EndpointFound {
                endpoint_id: endpoint_id.clone(),
                endpoint_info,
                service_id: service_id.to_string(),
            }),
            None => debug!("endpoint {} found while not discovering", endpoint_id),
        }
    }

    fn on_endpoint_lost(&self, endpoint_id: &EndpointId) {
        let listener = self.discovery.read().as_ref().map(|d| d.listener.clone());
        if let Some(listener) = listener {
            listener.emit(DiscoveryEvent::EndpointLost {
                endpoint_id: endpoint_id.clone(),
            });
        }
    }

    fn on_endpoint_distance_changed(&self, endpoint_id: &EndpointId, distance: DistanceInfo) {
        let listener = self.discovery.read().as_ref().map(|d| d.listener.clone());
        if let Some(listener) = listener {
            listener.emit(DiscoveryEvent::EndpointDistanceChanged {
                endpoint_id: endpoint_id.clone(),
                distance,
            });
        }
    }

    fn on_connection_initiated(
        &self,
        endpoint_id: &EndpointId,
        info: ConnectionResponseInfo,
        listener: Option<ConnectionListener>,
    ) {
        let incoming = info.is_incoming_connection;
        let listener = listener
            .or_else(|| {
                self.advertising
                    .read()
                    .as_ref()
                    .map(|a| a.info.listener.clone())
            })
            .or_else(|| self.listening.read().as_ref().map(|l| l.listener.clone()));
        let Some(listener) = listener else {
            warn!(
                "client {} dropping connection from {}: no listener",
                self.client_id, endpoint_id
            );
            return;
        };

        self.add_cancellation_flag(endpoint_id);
        self.connections.insert(
            endpoint_id.clone(),
            Connection {
                relation: if incoming {
                    EndpointRelation::PendingIncoming
                } else {
                    EndpointRelation::PendingOutgoing
                },
                local_responded: false,
                listener: listener.clone(),
                payload_listener: None,
            },
        );
        listener.emit(ConnectionEvent::Initiated {
            endpoint_id: endpoint_id.clone(),
            info,
        });
    }

    fn local_endpoint_accepted(&self, endpoint_id: &EndpointId, listener: PayloadListener) {
        if let Some(mut connection) = self.connections.get_mut(endpoint_id) {
            connection.local_responded = true;
            connection.payload_listener = Some(listener);
        }
    }

    fn local_endpoint_rejected(&self, endpoint_id: &EndpointId) {
        if let Some(mut connection) = self.connections.get_mut(endpoint_id) {
            connection.local_responded = true;
        }
    }

    fn on_connection_accepted(&self, endpoint_id: &EndpointId) {
        let listener = match self.connections.get_mut(endpoint_id) {
            Some(mut connection) => {
                connection.relation = EndpointRelation::Connected;
                connection.listener.clone()
            }
            None => {
                debug!("accept for unknown endpoint {}", endpoint_id);
                return;
            }
        };
        listener.emit(ConnectionEvent::Accepted {
            endpoint_id: endpoint_id.clone(),
        });
    }

    fn on_connection_rejected(&self, endpoint_id: &EndpointId, status: Status) {
        if let Some(listener) = self.end_connection(endpoint_id) {
            listener.emit(ConnectionEvent::Rejected {
                endpoint_id: endpoint_id.clone(),
                status,
            });
        }
    }

    fn on_disconnected(&self, endpoint_id: &EndpointId) {
        if let Some(listener) = self.end_connection(endpoint_id) {
            listener.emit(ConnectionEvent::Disconnected {
                endpoint_id: endpoint_id.clone(),
            });
        }
    }

    fn on_bandwidth_changed(&self, endpoint_id: &EndpointId, medium: Medium) {
        if let Some(listener) = self.connection_listener(endpoint_id) {
            listener.emit(ConnectionEvent::BandwidthChanged {
                endpoint_id: endpoint_id.clone(),
                medium,
            });
        }
    }

    fn on_payload(&self, endpoint_id: &EndpointId, payload: Payload) {
        let listener = self
            .connections
            .get(endpoint_id)
            .and_then(|c| c.payload_listener.clone());
        match listener {
            Some(listener) => listener.emit(PayloadEvent::Received {
                endpoint_id: endpoint_id.clone(),
                payload,
            }),
            None => warn!("dropping payload {} from {}: no listener", payload.id(), endpoint_id),
        }
    }

    fn on_payload_progress(&self, endpoint_id: &EndpointId, info: PayloadProgressInfo) {
        let listener = self
            .connections
            .get(endpoint_id)
            .and_then(|c| c.payload_listener.clone());
        if let Some(listener) = listener {
            listener.emit(PayloadEvent::Progress {
                endpoint_id: endpoint_id.clone(),
                info,
            });
        }
    }
}
