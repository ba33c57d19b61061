//! Transport controller contract.
//!
//! The controller does the actual radio work. The router owns exactly one
//! and only ever calls it from the serializer thread, except for the two
//! listening passthroughs, which take the same lock from the caller's
//! thread. Controllers report progress back through the
//! [`ClientSession`](crate::session::ClientSession) lifecycle hooks.

use std::path::Path;

use crate::errors::Status;
use crate::listener::{ConnectionListener, DiscoveryListener, PayloadListener};
use crate::options::{
    AdvertisingOptions, ConnectionListeningOptions, ConnectionOptions, DiscoveryOptions,
};
use crate::payload::{Payload, PayloadId};
use crate::session::SessionHandle;
use crate::types::{ConnectionRequestInfo, EndpointId, OutOfBandConnectionMetadata};

/// Operations the router delegates to once its guards pass.
///
/// Calls must not block for long: every call runs inside a serializer task,
/// and the serializer cannot advance until it returns. Long-running work is
/// started here and reported later through the session hooks.
pub trait TransportController: Send {
    fn start_advertising(
        &mut self,
        session: &SessionHandle,
        service_id: &str,
        options: &AdvertisingOptions,
        info: ConnectionRequestInfo,
    ) -> Status;

    fn stop_advertising(&mut self, session: &SessionHandle);

    fn start_discovery(
        &mut self,
        session: &SessionHandle,
        service_id: &str,
        options: &DiscoveryOptions,
        listener: DiscoveryListener,
    ) -> Status;

    fn stop_discovery(&mut self, session: &SessionHandle);

    /// Metadata has already been validated by the router.
    fn inject_endpoint(
        &mut self,
        session: &SessionHandle,
        service_id: &str,
        metadata: &OutOfBandConnectionMetadata,
    );

    fn request_connection(
        &mut self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        info: ConnectionRequestInfo,
        options: &ConnectionOptions,
    ) -> Status;

    fn accept_connection(
        &mut self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        listener: PayloadListener,
    ) -> Status;

    fn reject_connection(&mut self, session: &SessionHandle, endpoint_id: &EndpointId) -> Status;

    /// Completion is reported through the bandwidth-changed event.
    fn initiate_bandwidth_upgrade(&mut self, session: &SessionHandle, endpoint_id: &EndpointId);

    /// Per-endpoint outcomes are reported through payload progress events.
    fn send_payload(&mut self, session: &SessionHandle, endpoint_ids: &[EndpointId], payload: Payload);

    fn cancel_payload(&mut self, session: &SessionHandle, payload_id: PayloadId) -> Status;

    fn disconnect_from_endpoint(&mut self, session: &SessionHandle, endpoint_id: &EndpointId);

    fn update_advertising_options(
        &mut self,
        session: &SessionHandle,
        service_id: &str,
        options: &AdvertisingOptions,
    ) -> Status;

    fn update_discovery_options(
        &mut self,
        session: &SessionHandle,
        service_id: &str,
        options: &DiscoveryOptions,
    ) -> Status;

    fn start_listening_for_incoming_connections(
        &mut self,
        session: &SessionHandle,
        service_id: &str,
        listener: ConnectionListener,
        options: &ConnectionListeningOptions,
    ) -> Status;

    fn stop_listening_for_incoming_connections(&mut self, session: &SessionHandle);

    fn set_custom_save_path(&mut self, session: &SessionHandle, path: &Path);

    /// Release bandwidth-upgrade execution resources.
    fn shutdown_bwu_executors(&mut self);

    /// Stop all transport activity. No call follows this one.
    fn stop(&mut self);
}
