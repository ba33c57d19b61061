//! Device-centric API surface.
//!
//! Callers address remote peers by [`NearbyDevice`] instead of by endpoint
//! id. [`DeviceAdapter`] unwraps the device into its endpoint id, wraps
//! device-shaped listeners into endpoint-shaped ones and forwards to the
//! [`Router`] unchanged. It owns no state and adds no guards.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::errors::Status;
use crate::listener::{ConnectionEvent, Listener, PayloadEvent, ResultCallback};
use crate::medium::{classify, Medium, Quality};
use crate::options::{
    AdvertisingOptions, ConnectionListeningOptions, ConnectionOptions, DiscoveryOptions,
};
use crate::payload::{Payload, PayloadId};
use crate::router::Router;
use crate::session::SessionHandle;
use crate::types::{
    ConnectionRequestInfo, ConnectionResponseInfo, EndpointId, PayloadProgressInfo,
};

// ============================================================================
// Devices
// ============================================================================

/// A peer reachable through the connections stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionsDevice {
    pub endpoint_id: EndpointId,
    pub endpoint_info: Bytes,
}

impl ConnectionsDevice {
    pub fn new(endpoint_id: EndpointId, endpoint_info: Bytes) -> Self {
        Self {
            endpoint_id,
            endpoint_info,
        }
    }

    /// Device known only by its id.
    pub fn bare(endpoint_id: EndpointId) -> Self {
        Self::new(endpoint_id, Bytes::new())
    }
}

/// A peer found through presence scanning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresenceDevice {
    pub endpoint_id: EndpointId,
    pub device_metadata: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NearbyDevice {
    Connections(ConnectionsDevice),
    Presence(PresenceDevice),
}

impl NearbyDevice {
    pub fn endpoint_id(&self) -> &EndpointId {
        match self {
            NearbyDevice::Connections(d) => &d.endpoint_id,
            NearbyDevice::Presence(d) => &d.endpoint_id,
        }
    }

    /// Endpoint info to advertise for this device. Only connections devices
    /// carry one.
    pub fn endpoint_info(&self) -> Bytes {
        match self {
            NearbyDevice::Connections(d) => d.endpoint_info.clone(),
            NearbyDevice::Presence(_) => Bytes::new(),
        }
    }
}

impl From<ConnectionsDevice> for NearbyDevice {
    fn from(device: ConnectionsDevice) -> Self {
        NearbyDevice::Connections(device)
    }
}

impl From<PresenceDevice> for NearbyDevice {
    fn from(device: PresenceDevice) -> Self {
        NearbyDevice::Presence(device)
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitialConnectionInfo {
    pub authentication_digits: String,
    pub raw_authentication_token: Bytes,
    pub is_incoming_connection: bool,
}

impl From<&ConnectionResponseInfo> for InitialConnectionInfo {
    fn from(info: &ConnectionResponseInfo) -> Self {
        Self {
            authentication_digits: info.authentication_token.clone(),
            raw_authentication_token: info.raw_authentication_token.clone(),
            is_incoming_connection: info.is_incoming_connection,
        }
    }
}

/// Outcome of the accept/reject exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionResult {
    pub status: Status,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandwidthInfo {
    pub quality: Quality,
    pub medium: Medium,
}

impl BandwidthInfo {
    pub fn for_medium(medium: Medium) -> Self {
        Self {
            quality: classify(medium),
            medium,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceConnectionEvent {
    Initiated {
        device: ConnectionsDevice,
        info: InitialConnectionInfo,
    },
    /// Accepted (`Success`) or rejected
    Result {
        device: ConnectionsDevice,
        result: ConnectionResult,
    },
    Disconnected { device: ConnectionsDevice },
    BandwidthChanged {
        device: ConnectionsDevice,
        info: BandwidthInfo,
    },
}

#[derive(Debug)]
pub enum DevicePayloadEvent {
    Received {
        device: ConnectionsDevice,
        payload: Payload,
    },
    Progress {
        device: ConnectionsDevice,
        info: PayloadProgressInfo,
    },
}

pub type DeviceConnectionListener = Listener<DeviceConnectionEvent>;
pub type DevicePayloadListener = Listener<DevicePayloadEvent>;

/// Outgoing request addressed from a local device.
#[derive(Clone, Debug)]
pub struct DeviceConnectionRequestInfo {
    pub local_device: NearbyDevice,
    pub listener: DeviceConnectionListener,
}

pub fn translate_connection_event(event: ConnectionEvent) -> DeviceConnectionEvent {
    match event {
        ConnectionEvent::Initiated { endpoint_id, info } => DeviceConnectionEvent::Initiated {
            info: InitialConnectionInfo::from(&info),
            device: ConnectionsDevice::new(endpoint_id, info.remote_endpoint_info),
        },
        ConnectionEvent::Accepted { endpoint_id } => DeviceConnectionEvent::Result {
            device: ConnectionsDevice::bare(endpoint_id),
            result: ConnectionResult {
                status: Status::Success,
            },
        },
        ConnectionEvent::Rejected {
            endpoint_id,
            status,
        } => DeviceConnectionEvent::Result {
            device: ConnectionsDevice::bare(endpoint_id),
            result: ConnectionResult { status },
        },
        ConnectionEvent::Disconnected { endpoint_id } => DeviceConnectionEvent::Disconnected {
            device: ConnectionsDevice::bare(endpoint_id),
        },
        ConnectionEvent::BandwidthChanged {
            endpoint_id,
            medium,
        } => DeviceConnectionEvent::BandwidthChanged {
            device: ConnectionsDevice::bare(endpoint_id),
            info: BandwidthInfo::for_medium(medium),
        },
    }
}

pub fn translate_payload_event(event: PayloadEvent) -> DevicePayloadEvent {
    match event {
        PayloadEvent::Received {
            endpoint_id,
            payload,
        } => DevicePayloadEvent::Received {
            device: ConnectionsDevice::bare(endpoint_id),
            payload,
        },
        PayloadEvent::Progress { endpoint_id, info } => DevicePayloadEvent::Progress {
            device: ConnectionsDevice::bare(endpoint_id),
            info,
        },
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Device-centric front end over a shared [`Router`].
#[derive(Clone, Debug)]
pub struct DeviceAdapter {
    router: Arc<Router>,
}

impl DeviceAdapter {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn request_connection(
        &self,
        session: &SessionHandle,
        remote: &NearbyDevice,
        info: DeviceConnectionRequestInfo,
        options: ConnectionOptions,
        callback: ResultCallback,
    ) {
        let request = ConnectionRequestInfo {
            endpoint_info: info.local_device.endpoint_info(),
            listener: info.listener.adapt(translate_connection_event),
        };
        self.router
            .request_connection(session, remote.endpoint_id(), request, options, callback);
    }

    pub fn accept_connection(
        &self,
        session: &SessionHandle,
        remote: &NearbyDevice,
        listener: DevicePayloadListener,
        callback: ResultCallback,
    ) {
        self.router.accept_connection(
            session,
            remote.endpoint_id(),
            listener.adapt(translate_payload_event),
            callback,
        );
    }

    pub fn reject_connection(
        &self,
        session: &SessionHandle,
        remote: &NearbyDevice,
        callback: ResultCallback,
    ) {
        self.router
            .reject_connection(session, remote.endpoint_id(), callback);
    }

    pub fn initiate_bandwidth_upgrade(
        &self,
        session: &SessionHandle,
        remote: &NearbyDevice,
        callback: ResultCallback,
    ) {
        self.router
            .initiate_bandwidth_upgrade(session, remote.endpoint_id(), callback);
    }

    pub fn send_payload(
        &self,
        session: &SessionHandle,
        remote: &NearbyDevice,
        payload: Payload,
        callback: ResultCallback,
    ) {
        self.router.send_payload(
            session,
            vec![remote.endpoint_id().clone()],
            payload,
            callback,
        );
    }

    /// `recipient` names the device the payload was addressed to; the
    /// payload id alone selects what is cancelled.
    pub fn cancel_payload(
        &self,
        session: &SessionHandle,
        recipient: &NearbyDevice,
        payload_id: PayloadId,
        callback: ResultCallback,
    ) {
        debug!(
            "cancelling payload {} sent to {}",
            payload_id,
            recipient.endpoint_id()
        );
        self.router.cancel_payload(session, payload_id, callback);
    }

    pub fn update_advertising_options(
        &self,
        session: &SessionHandle,
        service_id: &str,
        options: AdvertisingOptions,
        callback: ResultCallback,
    ) {
        self.router
            .update_advertising_options(session, service_id, options, callback);
    }

    pub fn update_discovery_options(
        &self,
        session: &SessionHandle,
        service_id: &str,
        options: DiscoveryOptions,
        callback: ResultCallback,
    ) {
        self.router
            .update_discovery_options(session, service_id, options, callback);
    }

    pub fn disconnect(
        &self,
        session: &SessionHandle,
        remote: &NearbyDevice,
        callback: ResultCallback,
    ) {
        self.router
            .disconnect_from_endpoint(session, remote.endpoint_id(), callback);
    }

    pub fn start_listening_for_incoming_connections(
        &self,
        session: &SessionHandle,
        service_id: &str,
        listener: DeviceConnectionListener,
        options: &ConnectionListeningOptions,
    ) -> Status {
        self.router.start_listening_for_incoming_connections(
            session,
            service_id,
            listener.adapt(translate_connection_event),
            options,
        )
    }

    pub fn stop_listening_for_incoming_connections(&self, session: &SessionHandle) {
        self.router.stop_listening_for_incoming_connections(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiated_carries_remote_info() {
        let event = translate_connection_event(ConnectionEvent::Initiated {
            endpoint_id: EndpointId::from("ABCD"),
            info: ConnectionResponseInfo {
                remote_endpoint_info: Bytes::from_static(b"phone"),
                authentication_token: "0420".into(),
                raw_authentication_token: Bytes::from_static(b"raw"),
                is_incoming_connection: true,
                is_connection_verified: false,
            },
        });
        assert_eq!(
            event,
            DeviceConnectionEvent::Initiated {
                device: ConnectionsDevice::new(
                    EndpointId::from("ABCD"),
                    Bytes::from_static(b"phone")
                ),
                info: InitialConnectionInfo {
                    authentication_digits: "0420".into(),
                    raw_authentication_token: Bytes::from_static(b"raw"),
                    is_incoming_connection: true,
                },
            }
        );
    }

    #[test]
    fn test_accept_and_reject_become_results() {
        let id = EndpointId::from("WXYZ");
        assert_eq!(
            translate_connection_event(ConnectionEvent::Accepted {
                endpoint_id: id.clone()
            }),
            DeviceConnectionEvent::Result {
                device: ConnectionsDevice::bare(id.clone()),
                result: ConnectionResult {
                    status: Status::Success
                },
            }
        );
        assert_eq!(
            translate_connection_event(ConnectionEvent::Rejected {
                endpoint_id: id.clone(),
                status: Status::ConnectionRejected,
            }),
            DeviceConnectionEvent::Result {
                device: ConnectionsDevice::bare(id),
                result: ConnectionResult {
                    status: Status::ConnectionRejected
                },
            }
        );
    }

    #[test]
    fn test_bandwidth_changed_is_classified() {
        let event = translate_connection_event(ConnectionEvent::BandwidthChanged {
            endpoint_id: EndpointId::from("BWU1"),
            medium: Medium::WifiHotspot,
        });
        match event {
            DeviceConnectionEvent::BandwidthChanged { info, .. } => {
                assert_eq!(info.quality, Quality::High);
                assert_eq!(info.medium, Medium::WifiHotspot);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_presence_device_has_no_endpoint_info() {
        let device = NearbyDevice::from(PresenceDevice {
            endpoint_id: EndpointId::from("PRES"),
            device_metadata: Bytes::from_static(b"meta"),
        });
        assert!(device.endpoint_info().is_empty());
        assert_eq!(device.endpoint_id().as_str(), "PRES");

        let device = NearbyDevice::from(ConnectionsDevice::new(
            EndpointId::from("CONN"),
            Bytes::from_static(b"laptop"),
        ));
        assert_eq!(device.endpoint_info(), Bytes::from_static(b"laptop"));
    }
}
