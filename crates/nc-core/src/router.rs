//! Connection-request router.
//!
//! Every state-mutating operation is turned into a named task on one
//! [`Serializer`]; the task checks its guards against the session, delegates
//! to the transport controller if they pass, and completes the caller's
//! [`ResultCallback`] before the next task starts. This gives a total order
//! over all operations of all sessions sharing the router.
//!
//! Cancellation is the exception: registering and raising cancellation
//! flags happens on the caller's thread before the task is queued, so that a
//! cancel can overtake work that is already waiting in the queue.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::controller::TransportController;
use crate::errors::{RouterError, Status};
use crate::listener::{
    hold_events, ConnectionListener, DiscoveryListener, PayloadListener, ResultCallback,
};
use crate::medium::Medium;
use crate::options::{
    AdvertisingOptions, ConnectionListeningOptions, ConnectionOptions, DiscoveryOptions,
};
use crate::payload::{Payload, PayloadId};
use crate::serializer::{Serializer, SerializerStatsSnapshot};
use crate::session::{ClientSession, SessionHandle};
use crate::types::{
    ConnectionRequestInfo, EndpointId, OutOfBandConnectionMetadata, ENDPOINT_ID_LENGTH,
    MAC_ADDRESS_LENGTH, MAX_ENDPOINT_INFO_LENGTH,
};

type SharedController = Arc<Mutex<Box<dyn TransportController>>>;

// ============================================================================
// Router
// ============================================================================

/// Serializes connection requests from any number of client sessions onto
/// one transport controller.
pub struct Router {
    controller: SharedController,
    serializer: Serializer,
    closed: Arc<AtomicBool>,
}

impl Router {
    /// Router with default configuration.
    pub fn new(controller: Box<dyn TransportController>) -> Result<Self, RouterError> {
        Self::with_config(controller, &RouterConfig::default())
    }

    pub fn with_config(
        controller: Box<dyn TransportController>,
        config: &RouterConfig,
    ) -> Result<Self, RouterError> {
        config.validate()?;
        let serializer = Serializer::new(&config.serializer_thread_name, config.queue_warn_depth)?;
        info!("Router going up");
        Ok(Self {
            controller: Arc::new(Mutex::new(controller)),
            serializer,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn stats(&self) -> SerializerStatsSnapshot {
        self.serializer.stats()
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the transport controller, then discard every queued task. The
    /// callbacks of discarded tasks, and of any operation submitted later,
    /// report [`Status::Error`]. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Router going down");
        // Taking the lock waits for a task that is currently running.
        let ((), held) = {
            let mut controller = self.controller.lock();
            hold_events(|| controller.stop())
        };
        held.deliver();
        self.serializer.shutdown();
    }

    /// Queue `body` under `name`; its status completes `callback`.
    ///
    /// A body that dequeues after shutdown began is skipped; its callback
    /// reports [`Status::Error`] when dropped.
    fn route<F>(&self, name: &'static str, callback: ResultCallback, body: F)
    where
        F: FnOnce(&mut dyn TransportController) -> Status + Send + 'static,
    {
        if self.is_shut_down() {
            warn!("Router is shut down, refusing {}", name);
            return;
        }
        let controller = Arc::clone(&self.controller);
        let closed = Arc::clone(&self.closed);
        let queued = self.serializer.submit(name, move || {
            let (status, held) = {
                let mut controller = controller.lock();
                if closed.load(Ordering::SeqCst) {
                    (None, None)
                } else {
                    let (status, held) = hold_events(|| body(controller.as_mut()));
                    (Some(status), Some(held))
                }
            };
            // Sinks may call back into the router; the lock is released.
            if let Some(held) = held {
                held.deliver();
            }
            match status {
                Some(status) => callback.complete(status),
                None => debug!("skipping {} after shutdown", name),
            }
        });
        if !queued {
            warn!("Router is shut down, refusing {}", name);
        }
    }

    // ------------------------------------------------------------------------
    // Advertising and discovery
    // ------------------------------------------------------------------------

    pub fn start_advertising(
        &self,
        session: &SessionHandle,
        service_id: &str,
        options: AdvertisingOptions,
        info: ConnectionRequestInfo,
        callback: ResultCallback,
    ) {
        let session = Arc::clone(session);
        let service_id = service_id.to_string();
        self.route("start-advertising", callback, move |controller| {
            if session.is_advertising() {
                warn!("Client {} is already advertising", session.client_id());
                return Status::AlreadyAdvertising;
            }
            info!(
                "Client {} requested advertising for service {}",
                session.client_id(),
                service_id
            );
            controller.start_advertising(&session, &service_id, &options, info)
        });
    }

    pub fn stop_advertising(&self, session: &SessionHandle, callback: ResultCallback) {
        let session = Arc::clone(session);
        self.route("stop-advertising", callback, move |controller| {
            if session.is_advertising() {
                controller.stop_advertising(&session);
            }
            Status::Success
        });
    }

    pub fn start_discovery(
        &self,
        session: &SessionHandle,
        service_id: &str,
        options: DiscoveryOptions,
        listener: DiscoveryListener,
        callback: ResultCallback,
    ) {
        let session = Arc::clone(session);
        let service_id = service_id.to_string();
        self.route("start-discovery", callback, move |controller| {
            if session.is_discovering() {
                warn!("Client {} is already discovering", session.client_id());
                return Status::AlreadyDiscovering;
            }
            info!(
                "Client {} requested discovery for service {}",
                session.client_id(),
                service_id
            );
            controller.start_discovery(&session, &service_id, &options, listener)
        });
    }

    pub fn stop_discovery(&self, session: &SessionHandle, callback: ResultCallback) {
        let session = Arc::clone(session);
        self.route("stop-discovery", callback, move |controller| {
            if session.is_discovering() {
                controller.stop_discovery(&session);
            }
            Status::Success
        });
    }

    pub fn update_advertising_options(
        &self,
        session: &SessionHandle,
        service_id: &str,
        options: AdvertisingOptions,
        callback: ResultCallback,
    ) {
        let session = Arc::clone(session);
        let service_id = service_id.to_string();
        self.route("update-advertising-options", callback, move |controller| {
            controller.update_advertising_options(&session, &service_id, &options)
        });
    }

    pub fn update_discovery_options(
        &self,
        session: &SessionHandle,
        service_id: &str,
        options: DiscoveryOptions,
        callback: ResultCallback,
    ) {
        let session = Arc::clone(session);
        let service_id = service_id.to_string();
        self.route("update-discovery-options", callback, move |controller| {
            controller.update_discovery_options(&session, &service_id, &options)
        });
    }

    /// Feed an endpoint learned out of band into the active discovery.
    pub fn inject_endpoint(
        &self,
        session: &SessionHandle,
        service_id: &str,
        metadata: OutOfBandConnectionMetadata,
        callback: ResultCallback,
    ) {
        let session = Arc::clone(session);
        let service_id = service_id.to_string();
        self.route("inject-endpoint", callback, move |controller| {
            let status = validate_injection(&metadata);
            if !status.is_ok() {
                warn!(
                    "Client {} injected malformed endpoint {} (mac {})",
                    session.client_id(),
                    metadata.endpoint_id,
                    hex::encode(&metadata.remote_bluetooth_mac_address)
                );
                return status;
            }
            if !session.is_discovering() {
                warn!(
                    "Client {} injected endpoint {} while not discovering",
                    session.client_id(),
                    metadata.endpoint_id
                );
                return Status::OutOfOrderApiCall;
            }
            controller.inject_endpoint(&session, &service_id, &metadata);
            Status::Success
        });
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    pub fn request_connection(
        &self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        info: ConnectionRequestInfo,
        options: ConnectionOptions,
        callback: ResultCallback,
    ) {
        // Registered here so a cancel racing this request is never lost.
        session.add_cancellation_flag(endpoint_id);

        let session = Arc::clone(session);
        let endpoint_id = endpoint_id.clone();
        self.route("request-connection", callback, move |controller| {
            if session.is_connected_to_endpoint(&endpoint_id)
                || session.has_pending_connection_to_endpoint(&endpoint_id)
            {
                warn!(
                    "Client {} already has a connection to {}",
                    session.client_id(),
                    endpoint_id
                );
                return Status::AlreadyConnectedToEndpoint;
            }
            if session.is_endpoint_cancelled(&endpoint_id) {
                warn!(
                    "Client {} cancelled {} before the request ran",
                    session.client_id(),
                    endpoint_id
                );
                roll_back_request(&session, &endpoint_id);
                return Status::EndpointIoError;
            }

            session.add_cancellation_flag(&endpoint_id);
            let status = controller.request_connection(&session, &endpoint_id, info, &options);
            if !status.is_ok() {
                debug!(
                    "Client {} request to {} failed with {}; rolling back",
                    session.client_id(),
                    endpoint_id,
                    status
                );
                roll_back_request(&session, &endpoint_id);
            }
            status
        });
    }

    pub fn accept_connection(
        &self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        listener: PayloadListener,
        callback: ResultCallback,
    ) {
        let session = Arc::clone(session);
        let endpoint_id = endpoint_id.clone();
        self.route("accept-connection", callback, move |controller| {
            let status = check_response_guards(session.as_ref(), &endpoint_id, "accept");
            if !status.is_ok() {
                return status;
            }
            if session.is_endpoint_cancelled(&endpoint_id) {
                warn!(
                    "Client {} accepted {} after it was cancelled",
                    session.client_id(),
                    endpoint_id
                );
                return Status::EndpointIoError;
            }
            controller.accept_connection(&session, &endpoint_id, listener)
        });
    }

    pub fn reject_connection(
        &self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        callback: ResultCallback,
    ) {
        // Preempt an accept that may already be queued.
        session.cancel_endpoint(endpoint_id);

        let session = Arc::clone(session);
        let endpoint_id = endpoint_id.clone();
        self.route("reject-connection", callback, move |controller| {
            let status = check_response_guards(session.as_ref(), &endpoint_id, "reject");
            if !status.is_ok() {
                return status;
            }
            controller.reject_connection(&session, &endpoint_id)
        });
    }

    /// Succeeds as soon as the upgrade is started; the outcome arrives as a
    /// bandwidth-changed event.
    pub fn initiate_bandwidth_upgrade(
        &self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        callback: ResultCallback,
    ) {
        let session = Arc::clone(session);
        let endpoint_id = endpoint_id.clone();
        self.route("init-bwu", callback, move |controller| {
            if !session.is_connected_to_endpoint(&endpoint_id) {
                warn!(
                    "Client {} upgrading bandwidth of unconnected {}",
                    session.client_id(),
                    endpoint_id
                );
                return Status::OutOfOrderApiCall;
            }
            controller.initiate_bandwidth_upgrade(&session, &endpoint_id);
            Status::Success
        });
    }

    /// Succeeds once the payload is handed to the controller; transfer
    /// results arrive as payload progress events.
    pub fn send_payload(
        &self,
        session: &SessionHandle,
        endpoint_ids: Vec<EndpointId>,
        payload: Payload,
        callback: ResultCallback,
    ) {
        let session = Arc::clone(session);
        self.route("send-payload", callback, move |controller| {
            if !endpoint_ids
                .iter()
                .any(|id| session.is_connected_to_endpoint(id))
            {
                warn!(
                    "Client {} sent payload {} to no connected endpoint",
                    session.client_id(),
                    payload.id()
                );
                return Status::EndpointUnknown;
            }
            controller.send_payload(&session, &endpoint_ids, payload);
            Status::Success
        });
    }

    pub fn cancel_payload(
        &self,
        session: &SessionHandle,
        payload_id: PayloadId,
        callback: ResultCallback,
    ) {
        let session = Arc::clone(session);
        self.route("cancel-payload", callback, move |controller| {
            controller.cancel_payload(&session, payload_id)
        });
    }

    pub fn disconnect_from_endpoint(
        &self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        callback: ResultCallback,
    ) {
        session.cancel_endpoint(endpoint_id);

        let session = Arc::clone(session);
        let endpoint_id = endpoint_id.clone();
        self.route("disconnect-endpoint", callback, move |controller| {
            if !session.is_connected_to_endpoint(&endpoint_id)
                && !session.has_pending_connection_to_endpoint(&endpoint_id)
            {
                warn!(
                    "Client {} disconnecting from unknown {}",
                    session.client_id(),
                    endpoint_id
                );
                return Status::OutOfOrderApiCall;
            }
            controller.disconnect_from_endpoint(&session, &endpoint_id);
            Status::Success
        });
    }

    /// Tear the whole session down.
    pub fn stop_all_endpoints(&self, session: &SessionHandle, callback: ResultCallback) {
        session.cancel_all_endpoints();

        let session = Arc::clone(session);
        self.route("stop-all-endpoints", callback, move |controller| {
            info!("Client {} is stopping all endpoints", session.client_id());
            finish_client_session(controller, &session);
            Status::Success
        });
    }

    // ------------------------------------------------------------------------
    // Passthroughs
    // ------------------------------------------------------------------------

    pub fn set_custom_save_path(
        &self,
        session: &SessionHandle,
        path: impl Into<PathBuf>,
        callback: ResultCallback,
    ) {
        let session = Arc::clone(session);
        let path = path.into();
        self.route("set-custom-save-path", callback, move |controller| {
            info!(
                "Client {} set custom save path to {}",
                session.client_id(),
                path.display()
            );
            controller.set_custom_save_path(&session, &path);
            Status::Success
        });
    }

    /// Runs on the calling thread; listening is configured outside the
    /// per-endpoint state machine.
    pub fn start_listening_for_incoming_connections(
        &self,
        session: &SessionHandle,
        service_id: &str,
        listener: ConnectionListener,
        options: &ConnectionListeningOptions,
    ) -> Status {
        let (status, held) = {
            let mut controller = self.controller.lock();
            if self.is_shut_down() {
                return Status::Error;
            }
            hold_events(|| {
                controller.start_listening_for_incoming_connections(
                    session, service_id, listener, options,
                )
            })
        };
        held.deliver();
        status
    }

    /// Runs on the calling thread.
    pub fn stop_listening_for_incoming_connections(&self, session: &SessionHandle) {
        let ((), held) = {
            let mut controller = self.controller.lock();
            if self.is_shut_down() {
                return;
            }
            hold_events(|| controller.stop_listening_for_incoming_connections(session))
        };
        held.deliver();
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("serializer", &self.serializer)
            .field("closed", &self.is_shut_down())
            .finish()
    }
}

// ============================================================================
// Guards and teardown
// ============================================================================

/// Structural checks on injected metadata, in order: medium and address,
/// endpoint id, endpoint info.
pub fn validate_injection(metadata: &OutOfBandConnectionMetadata) -> Status {
    if metadata.medium != Medium::Bluetooth
        || metadata.remote_bluetooth_mac_address.len() != MAC_ADDRESS_LENGTH
    {
        return Status::Error;
    }
    if metadata.endpoint_id.len() != ENDPOINT_ID_LENGTH {
        return Status::Error;
    }
    if metadata.endpoint_info.is_empty() || metadata.endpoint_info.len() > MAX_ENDPOINT_INFO_LENGTH
    {
        return Status::Error;
    }
    Status::Success
}

/// Guards shared by accept and reject.
fn check_response_guards(session: &dyn ClientSession, endpoint_id: &EndpointId, verb: &str) -> Status {
    if session.is_connected_to_endpoint(endpoint_id) {
        warn!(
            "Client {} cannot {} {}: already connected",
            session.client_id(),
            verb,
            endpoint_id
        );
        return Status::AlreadyConnectedToEndpoint;
    }
    if session.has_local_endpoint_responded(endpoint_id) {
        warn!(
            "Client {} cannot {} {}: already responded",
            session.client_id(),
            verb,
            endpoint_id
        );
        return Status::OutOfOrderApiCall;
    }
    Status::Success
}

fn roll_back_request(session: &SessionHandle, endpoint_id: &EndpointId) {
    session.cancel_endpoint(endpoint_id);
    session.remove_cancellation_flag(endpoint_id);
}

/// Disconnect pending then connected endpoints, stop advertising and
/// discovery, release upgrade executors, reset the session. Order matters.
fn finish_client_session(controller: &mut dyn TransportController, session: &SessionHandle) {
    for endpoint_id in session.pending_connected_endpoints() {
        controller.disconnect_from_endpoint(session, &endpoint_id);
    }
    for endpoint_id in session.connected_endpoints() {
        controller.disconnect_from_endpoint(session, &endpoint_id);
    }

    controller.stop_advertising(session);
    controller.stop_discovery(session);
    controller.shutdown_bwu_executors();

    session.reset();
}
