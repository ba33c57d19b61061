//! Per-client facade.
//!
//! [`Connections`] binds one session to a shared [`Router`], normalises
//! options before routing them and turns result callbacks into awaitable
//! statuses. Dropping it tears the session down.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::device::DeviceAdapter;
use crate::errors::Status;
use crate::listener::{ConnectionListener, DiscoveryListener, PayloadListener, ResultCallback};
use crate::options::{
    AdvertisingOptions, ConnectionListeningOptions, ConnectionOptions, DiscoveryOptions,
};
use crate::payload::{Payload, PayloadId};
use crate::router::Router;
use crate::session::{ClientSession, SessionHandle, SessionState};
use crate::types::{ConnectionRequestInfo, EndpointId, OutOfBandConnectionMetadata};

/// One client's view of a shared router.
pub struct Connections {
    router: Arc<Router>,
    session: SessionHandle,
}

impl Connections {
    /// Facade over a fresh session.
    pub fn new(router: Arc<Router>) -> Self {
        Self::with_session(router, SessionState::handle())
    }

    pub fn with_session(router: Arc<Router>, session: SessionHandle) -> Self {
        debug!("client {} attached to router", session.client_id());
        Self { router, session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn local_endpoint_id(&self) -> EndpointId {
        self.session.local_endpoint_id()
    }

    /// Device-centric front end over the same router.
    pub fn device_adapter(&self) -> DeviceAdapter {
        DeviceAdapter::new(Arc::clone(&self.router))
    }

    pub async fn start_advertising(
        &self,
        service_id: &str,
        options: &AdvertisingOptions,
        info: ConnectionRequestInfo,
    ) -> Status {
        let options = options.compatible_options();
        call(|cb| {
            self.router
                .start_advertising(&self.session, service_id, options, info, cb)
        })
        .await
    }

    pub async fn stop_advertising(&self) -> Status {
        call(|cb| self.router.stop_advertising(&self.session, cb)).await
    }

    pub async fn start_discovery(
        &self,
        service_id: &str,
        options: &DiscoveryOptions,
        listener: DiscoveryListener,
    ) -> Status {
        let options = options.compatible_options();
        call(|cb| {
            self.router
                .start_discovery(&self.session, service_id, options, listener, cb)
        })
        .await
    }

    pub async fn stop_discovery(&self) -> Status {
        call(|cb| self.router.stop_discovery(&self.session, cb)).await
    }

    pub async fn update_advertising_options(
        &self,
        service_id: &str,
        options: &AdvertisingOptions,
    ) -> Status {
        let options = options.compatible_options();
        call(|cb| {
            self.router
                .update_advertising_options(&self.session, service_id, options, cb)
        })
        .await
    }

    pub async fn update_discovery_options(
        &self,
        service_id: &str,
        options: &DiscoveryOptions,
    ) -> Status {
        let options = options.compatible_options();
        call(|cb| {
            self.router
                .update_discovery_options(&self.session, service_id, options, cb)
        })
        .await
    }

    pub async fn inject_endpoint(
        &self,
        service_id: &str,
        metadata: OutOfBandConnectionMetadata,
    ) -> Status {
        call(|cb| {
            self.router
                .inject_endpoint(&self.session, service_id, metadata, cb)
        })
        .await
    }

    pub async fn request_connection(
        &self,
        endpoint_id: &EndpointId,
        info: ConnectionRequestInfo,
        options: &ConnectionOptions,
    ) -> Status {
        let options = options.compatible_options();
        call(|cb| {
            self.router
                .request_connection(&self.session, endpoint_id, info, options, cb)
        })
        .await
    }

    pub async fn accept_connection(
        &self,
        endpoint_id: &EndpointId,
        listener: PayloadListener,
    ) -> Status {
        call(|cb| {
            self.router
                .accept_connection(&self.session, endpoint_id, listener, cb)
        })
        .await
    }

    pub async fn reject_connection(&self, endpoint_id: &EndpointId) -> Status {
        call(|cb| self.router.reject_connection(&self.session, endpoint_id, cb)).await
    }

    pub async fn initiate_bandwidth_upgrade(&self, endpoint_id: &EndpointId) -> Status {
        call(|cb| {
            self.router
                .initiate_bandwidth_upgrade(&self.session, endpoint_id, cb)
        })
        .await
    }

    pub async fn send_payload(&self, endpoint_ids: Vec<EndpointId>, payload: Payload) -> Status {
        call(|cb| {
            self.router
                .send_payload(&self.session, endpoint_ids, payload, cb)
        })
        .await
    }

    pub async fn cancel_payload(&self, payload_id: PayloadId) -> Status {
        call(|cb| self.router.cancel_payload(&self.session, payload_id, cb)).await
    }

    pub async fn disconnect_from_endpoint(&self, endpoint_id: &EndpointId) -> Status {
        call(|cb| {
            self.router
                .disconnect_from_endpoint(&self.session, endpoint_id, cb)
        })
        .await
    }

    pub async fn stop_all_endpoints(&self) -> Status {
        call(|cb| self.router.stop_all_endpoints(&self.session, cb)).await
    }

    pub async fn set_custom_save_path(&self, path: impl Into<PathBuf>) -> Status {
        let path = path.into();
        call(|cb| self.router.set_custom_save_path(&self.session, path, cb)).await
    }

    pub fn start_listening_for_incoming_connections(
        &self,
        service_id: &str,
        listener: ConnectionListener,
        options: &ConnectionListeningOptions,
    ) -> Status {
        self.router.start_listening_for_incoming_connections(
            &self.session,
            service_id,
            listener,
            options,
        )
    }

    pub fn stop_listening_for_incoming_connections(&self) {
        self.router
            .stop_listening_for_incoming_connections(&self.session);
    }
}

impl Drop for Connections {
    fn drop(&mut self) {
        self.router
            .stop_all_endpoints(&self.session, ResultCallback::ignore());
    }
}

impl std::fmt::Debug for Connections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connections")
            .field("client_id", &self.session.client_id())
            .field("local_endpoint_id", &self.session.local_endpoint_id())
            .finish()
    }
}

/// Submit through `submit` and wait for the reported status.
async fn call(submit: impl FnOnce(ResultCallback)) -> Status {
    let (cb, rx) = ResultCallback::channel();
    submit(cb);
    rx.await.unwrap_or(Status::Error)
}
