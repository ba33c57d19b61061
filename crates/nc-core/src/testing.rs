//! Testing utilities: an in-process transport controller.
//!
//! [`FakeController`] records every call, answers with configurable
//! statuses and simulates radio progress by driving the session hooks the
//! way a real controller would. Its [`FakeHandle`] stays with the test after
//! the controller is moved into a router.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};

use crate::controller::TransportController;
use crate::errors::Status;
use crate::listener::{ConnectionListener, DiscoveryListener, PayloadListener};
use crate::medium::Medium;
use crate::options::{
    AdvertisingOptions, ConnectionListeningOptions, ConnectionOptions, DiscoveryOptions,
};
use crate::payload::{Payload, PayloadId};
use crate::session::{ClientSession, SessionHandle};
use crate::types::{
    ConnectionRequestInfo, ConnectionResponseInfo, DistanceInfo, EndpointId,
    OutOfBandConnectionMetadata, PayloadProgressInfo, PayloadStatus,
};

/// One recorded controller call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerCall {
    StartAdvertising { service_id: String },
    StopAdvertising,
    StartDiscovery { service_id: String },
    StopDiscovery,
    InjectEndpoint { endpoint_id: EndpointId },
    RequestConnection { endpoint_id: EndpointId },
    AcceptConnection { endpoint_id: EndpointId },
    RejectConnection { endpoint_id: EndpointId },
    InitiateBandwidthUpgrade { endpoint_id: EndpointId },
    SendPayload {
        endpoint_ids: Vec<EndpointId>,
        payload_id: PayloadId,
    },
    CancelPayload { payload_id: PayloadId },
    DisconnectFromEndpoint { endpoint_id: EndpointId },
    UpdateAdvertisingOptions { service_id: String },
    UpdateDiscoveryOptions { service_id: String },
    StartListening { service_id: String },
    StopListening,
    SetCustomSavePath { path: PathBuf },
    ShutdownBwuExecutors,
    Stop,
}

/// Controller operations whose status can be overridden.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FakeOp {
    StartAdvertising,
    StartDiscovery,
    RequestConnection,
    AcceptConnection,
    RejectConnection,
    CancelPayload,
    UpdateAdvertisingOptions,
    UpdateDiscoveryOptions,
    StartListening,
}

#[derive(Default)]
struct FakeState {
    calls: Mutex<Vec<ControllerCall>>,
    statuses: Mutex<HashMap<FakeOp, Status>>,
    auto_remote_accept: AtomicBool,
    gate: Mutex<()>,
    in_flight: AtomicBool,
    violations: AtomicU64,
    payloads: Mutex<HashSet<PayloadId>>,
    stopped: AtomicBool,
    calls_after_stop: AtomicU64,
}

/// Marks one controller call as running; flags overlapping calls.
struct CallScope<'a> {
    state: &'a FakeState,
}

impl<'a> CallScope<'a> {
    /// Records the call before waiting on the gate, so a held call is
    /// already visible in [`FakeHandle::get_calls`].
    fn enter(state: &'a FakeState, call: ControllerCall) -> Self {
        state.calls.lock().push(call);
        // Wait while the test holds the gate.
        drop(state.gate.lock());
        if state.in_flight.swap(true, Ordering::SeqCst) {
            state.violations.fetch_add(1, Ordering::SeqCst);
        }
        if state.stopped.load(Ordering::SeqCst) {
            state.calls_after_stop.fetch_add(1, Ordering::SeqCst);
        }
        Self { state }
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        self.state.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Scriptable [`TransportController`].
pub struct FakeController {
    state: Arc<FakeState>,
}

/// Test-side view of a [`FakeController`].
#[derive(Clone)]
pub struct FakeHandle {
    state: Arc<FakeState>,
}

impl FakeController {
    /// Create a controller and its handle. Remote endpoints accept
    /// automatically unless disabled through the handle.
    pub fn new() -> (Self, FakeHandle) {
        let state = Arc::new(FakeState::default());
        state.auto_remote_accept.store(true, Ordering::SeqCst);
        (
            Self {
                state: Arc::clone(&state),
            },
            FakeHandle { state },
        )
    }

    /// Boxed controller ready for [`Router::new`](crate::router::Router::new).
    pub fn boxed() -> (Box<dyn TransportController>, FakeHandle) {
        let (controller, handle) = Self::new();
        (Box::new(controller), handle)
    }

    fn enter(&self, call: ControllerCall) -> CallScope<'_> {
        CallScope::enter(&self.state, call)
    }

    fn status(&self, op: FakeOp) -> Status {
        self.state
            .statuses
            .lock()
            .get(&op)
            .copied()
            .unwrap_or(Status::Success)
    }
}

impl FakeHandle {
    /// Get recorded calls
    pub fn get_calls(&self) -> Vec<ControllerCall> {
        self.state.calls.lock().clone()
    }

    /// Clear recorded calls
    pub fn clear_calls(&self) {
        self.state.calls.lock().clear();
    }

    pub fn count_calls(&self, pred: impl Fn(&ControllerCall) -> bool) -> usize {
        self.state.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Poll until `pred` holds for some recorded call. Returns false after
    /// `timeout`.
    pub fn wait_for_call(
        &self,
        pred: impl Fn(&ControllerCall) -> bool,
        timeout: std::time::Duration,
    ) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if self.count_calls(&pred) > 0 {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        self.count_calls(&pred) > 0
    }

    /// Answer `op` with `status` until cleared.
    pub fn set_status(&self, op: FakeOp, status: Status) {
        self.state.statuses.lock().insert(op, status);
    }

    pub fn clear_status(&self, op: FakeOp) {
        self.state.statuses.lock().remove(&op);
    }

    /// Whether a local accept immediately completes the connection.
    pub fn set_auto_remote_accept(&self, enabled: bool) {
        self.state.auto_remote_accept.store(enabled, Ordering::SeqCst);
    }

    /// Block every controller call until the returned guard is dropped.
    pub fn hold(&self) -> MutexGuard<'_, ()> {
        self.state.gate.lock()
    }

    /// Number of calls that overlapped another call.
    pub fn violations(&self) -> u64 {
        self.state.violations.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    pub fn calls_after_stop(&self) -> u64 {
        self.state.calls_after_stop.load(Ordering::SeqCst)
    }

    /// Simulate the radio reporting a new distance for a discovered endpoint.
    pub fn simulate_distance_changed(
        &self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        distance: DistanceInfo,
    ) {
        session.on_endpoint_distance_changed(endpoint_id, distance);
    }

    /// Simulate a remote endpoint requesting a connection.
    pub fn simulate_incoming(
        &self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        endpoint_info: Bytes,
    ) {
        session.on_connection_initiated(
            endpoint_id,
            ConnectionResponseInfo {
                remote_endpoint_info: endpoint_info,
                authentication_token: auth_token(endpoint_id),
                raw_authentication_token: Bytes::copy_from_slice(endpoint_id.as_str().as_bytes()),
                is_incoming_connection: true,
                is_connection_verified: false,
            },
            None,
        );
    }

    /// Simulate the remote side answering a pending connection.
    pub fn simulate_remote_response(
        &self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        accepted: bool,
    ) {
        if accepted {
            session.on_connection_accepted(endpoint_id);
        } else {
            session.on_connection_rejected(endpoint_id, Status::ConnectionRejected);
        }
    }

    /// Simulate an incoming bytes payload.
    pub fn simulate_payload(&self, session: &SessionHandle, endpoint_id: &EndpointId, data: Bytes) {
        session.on_payload(endpoint_id, Payload::bytes(data));
    }
}

impl TransportController for FakeController {
    fn start_advertising(
        &mut self,
        session: &SessionHandle,
        service_id: &str,
        _options: &AdvertisingOptions,
        info: ConnectionRequestInfo,
    ) -> Status {
        let _scope = self.enter(ControllerCall::StartAdvertising {
            service_id: service_id.to_string(),
        });
        let status = self.status(FakeOp::StartAdvertising);
        if status.is_ok() {
            session.started_advertising(service_id, info);
        }
        status
    }

    fn stop_advertising(&mut self, session: &SessionHandle) {
        let _scope = self.enter(ControllerCall::StopAdvertising);
        session.stopped_advertising();
    }

    fn start_discovery(
        &mut self,
        session: &SessionHandle,
        service_id: &str,
        _options: &DiscoveryOptions,
        listener: DiscoveryListener,
    ) -> Status {
        let _scope = self.enter(ControllerCall::StartDiscovery {
            service_id: service_id.to_string(),
        });
        let status = self.status(FakeOp::StartDiscovery);
        if status.is_ok() {
            session.started_discovery(service_id, listener);
        }
        status
    }

    fn stop_discovery(&mut self, session: &SessionHandle) {
        let _scope = self.enter(ControllerCall::StopDiscovery);
        session.stopped_discovery();
    }

    fn inject_endpoint(
        &mut self,
        session: &SessionHandle,
        service_id: &str,
        metadata: &OutOfBandConnectionMetadata,
    ) {
        let _scope = self.enter(ControllerCall::InjectEndpoint {
            endpoint_id: metadata.endpoint_id.clone(),
        });
        session.on_endpoint_found(
            &metadata.endpoint_id,
            metadata.endpoint_info.clone(),
            service_id,
        );
    }

    fn request_connection(
        &mut self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        info: ConnectionRequestInfo,
        _options: &ConnectionOptions,
    ) -> Status {
        let _scope = self.enter(ControllerCall::RequestConnection {
            endpoint_id: endpoint_id.clone(),
        });
        let status = self.status(FakeOp::RequestConnection);
        if status.is_ok() {
            session.on_connection_initiated(
                endpoint_id,
                ConnectionResponseInfo {
                    remote_endpoint_info: Bytes::from(format!("remote-{}", endpoint_id)),
                    authentication_token: auth_token(endpoint_id),
                    raw_authentication_token: Bytes::copy_from_slice(
                        endpoint_id.as_str().as_bytes(),
                    ),
                    is_incoming_connection: false,
                    is_connection_verified: false,
                },
                Some(info.listener),
            );
        }
        status
    }

    fn accept_connection(
        &mut self,
        session: &SessionHandle,
        endpoint_id: &EndpointId,
        listener: PayloadListener,
    ) -> Status {
        let _scope = self.enter(ControllerCall::AcceptConnection {
            endpoint_id: endpoint_id.clone(),
        });
        let status = self.status(FakeOp::AcceptConnection);
        if status.is_ok() {
            session.local_endpoint_accepted(endpoint_id, listener);
            if self.state.auto_remote_accept.load(Ordering::SeqCst) {
                session.on_connection_accepted(endpoint_id);
            }
        }
        status
    }

    fn reject_connection(&mut self, session: &SessionHandle, endpoint_id: &EndpointId) -> Status {
        let _scope = self.enter(ControllerCall::RejectConnection {
            endpoint_id: endpoint_id.clone(),
        });
        let status = self.status(FakeOp::RejectConnection);
        if status.is_ok() {
            session.local_endpoint_rejected(endpoint_id);
        }
        status
    }

    fn initiate_bandwidth_upgrade(&mut self, session: &SessionHandle, endpoint_id: &EndpointId) {
        let _scope = self.enter(ControllerCall::InitiateBandwidthUpgrade {
            endpoint_id: endpoint_id.clone(),
        });
        session.on_bandwidth_changed(endpoint_id, Medium::WifiLan);
    }

    fn send_payload(&mut self, session: &SessionHandle, endpoint_ids: &[EndpointId], payload: Payload) {
        let _scope = self.enter(ControllerCall::SendPayload {
            endpoint_ids: endpoint_ids.to_vec(),
            payload_id: payload.id(),
        });
        self.state.payloads.lock().insert(payload.id());

        let total_bytes = payload.size().map(|s| s as i64).unwrap_or(-1);
        for endpoint_id in endpoint_ids {
            let status = if session.is_connected_to_endpoint(endpoint_id) {
                PayloadStatus::Success
            } else {
                PayloadStatus::Failure
            };
            session.on_payload_progress(
                endpoint_id,
                PayloadProgressInfo {
                    payload_id: payload.id(),
                    status,
                    total_bytes,
                    bytes_transferred: if status == PayloadStatus::Success {
                        total_bytes.max(0)
                    } else {
                        0
                    },
                },
            );
        }
    }

    fn cancel_payload(&mut self, _session: &SessionHandle, payload_id: PayloadId) -> Status {
        let _scope = self.enter(ControllerCall::CancelPayload { payload_id });
        let status = self.status(FakeOp::CancelPayload);
        if !status.is_ok() {
            return status;
        }
        if self.state.payloads.lock().remove(&payload_id) {
            Status::Success
        } else {
            Status::PayloadUnknown
        }
    }

    fn disconnect_from_endpoint(&mut self, session: &SessionHandle, endpoint_id: &EndpointId) {
        let _scope = self.enter(ControllerCall::DisconnectFromEndpoint {
            endpoint_id: endpoint_id.clone(),
        });
        session.on_disconnected(endpoint_id);
    }

    fn update_advertising_options(
        &mut self,
        _session: &SessionHandle,
        service_id: &str,
        _options: &AdvertisingOptions,
    ) -> Status {
        let _scope = self.enter(ControllerCall::UpdateAdvertisingOptions {
            service_id: service_id.to_string(),
        });
        self.status(FakeOp::UpdateAdvertisingOptions)
    }

    fn update_discovery_options(
        &mut self,
        _session: &SessionHandle,
        service_id: &str,
        _options: &DiscoveryOptions,
    ) -> Status {
        let _scope = self.enter(ControllerCall::UpdateDiscoveryOptions {
            service_id: service_id.to_string(),
        });
        self.status(FakeOp::UpdateDiscoveryOptions)
    }

    fn start_listening_for_incoming_connections(
        &mut self,
        session: &SessionHandle,
        service_id: &str,
        listener: ConnectionListener,
        _options: &ConnectionListeningOptions,
    ) -> Status {
        let _scope = self.enter(ControllerCall::StartListening {
            service_id: service_id.to_string(),
        });
        if session.is_listening_for_incoming_connections() {
            return Status::AlreadyListening;
        }
        let status = self.status(FakeOp::StartListening);
        if status.is_ok() {
            session.started_listening(service_id, listener);
        }
        status
    }

    fn stop_listening_for_incoming_connections(&mut self, session: &SessionHandle) {
        let _scope = self.enter(ControllerCall::StopListening);
        session.stopped_listening();
    }

    fn set_custom_save_path(&mut self, _session: &SessionHandle, path: &Path) {
        let _scope = self.enter(ControllerCall::SetCustomSavePath {
            path: path.to_path_buf(),
        });
    }

    fn shutdown_bwu_executors(&mut self) {
        let _scope = self.enter(ControllerCall::ShutdownBwuExecutors);
    }

    fn stop(&mut self) {
        let _scope = self.enter(ControllerCall::Stop);
        self.state.stopped.store(true, Ordering::SeqCst);
    }
}

/// Four-digit token derived from the endpoint id.
fn auth_token(endpoint_id: &EndpointId) -> String {
    let sum: u32 = endpoint_id.as_str().bytes().map(u32::from).sum();
    format!("{:04}", sum % 10_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[test]
    fn test_records_calls_and_drives_session() {
        let (mut fake, handle) = FakeController::new();
        let session = SessionState::handle();
        let id = EndpointId::from("FAKE");
        let (listener, _rx) = ConnectionListener::channel();

        let status = fake.request_connection(
            &session,
            &id,
            ConnectionRequestInfo {
                endpoint_info: Bytes::from_static(b"me"),
                listener,
            },
            &ConnectionOptions::default(),
        );
        assert_eq!(status, Status::Success);
        assert!(session.has_pending_connection_to_endpoint(&id));

        fake.accept_connection(&session, &id, PayloadListener::noop());
        assert!(session.is_connected_to_endpoint(&id));

        fake.disconnect_from_endpoint(&session, &id);
        assert!(!session.is_connected_to_endpoint(&id));

        assert_eq!(
            handle.get_calls(),
            vec![
                ControllerCall::RequestConnection {
                    endpoint_id: id.clone()
                },
                ControllerCall::AcceptConnection {
                    endpoint_id: id.clone()
                },
                ControllerCall::DisconnectFromEndpoint { endpoint_id: id },
            ]
        );
        assert_eq!(handle.violations(), 0);
    }

    #[test]
    fn test_status_override() {
        let (mut fake, handle) = FakeController::new();
        let session = SessionState::handle();
        handle.set_status(FakeOp::StartDiscovery, Status::BluetoothError);

        let status = fake.start_discovery(
            &session,
            "svc",
            &DiscoveryOptions::default(),
            DiscoveryListener::noop(),
        );
        assert_eq!(status, Status::BluetoothError);
        assert!(!session.is_discovering());

        handle.clear_status(FakeOp::StartDiscovery);
        let status = fake.start_discovery(
            &session,
            "svc",
            &DiscoveryOptions::default(),
            DiscoveryListener::noop(),
        );
        assert!(status.is_ok());
        assert!(session.is_discovering());
    }

    #[test]
    fn test_cancel_unknown_payload() {
        let (mut fake, _handle) = FakeController::new();
        let session = SessionState::handle();
        assert_eq!(fake.cancel_payload(&session, 99), Status::PayloadUnknown);
    }
}
