//! Integration tests for the device-centric adapter.

use std::sync::Arc;

use bytes::Bytes;

use nc_core::{
    device::{
        BandwidthInfo, ConnectionResult, ConnectionsDevice, DeviceAdapter, DeviceConnectionEvent,
        DeviceConnectionListener, DeviceConnectionRequestInfo, DevicePayloadEvent,
        DevicePayloadListener, NearbyDevice, PresenceDevice,
    },
    options::{
        AdvertisingOptions, ConnectionListeningOptions, ConnectionOptions, DiscoveryOptions,
    },
    testing::{ControllerCall, FakeController, FakeHandle, FakeOp},
    ClientSession, EndpointId, Medium, Payload, Quality, ResultCallback, Router, SessionHandle,
    SessionState, Status,
};

fn setup() -> (DeviceAdapter, FakeHandle, SessionHandle) {
    let (controller, fake) = FakeController::boxed();
    let router = Arc::new(Router::new(controller).unwrap());
    (DeviceAdapter::new(router), fake, SessionState::handle())
}

fn remote(id: &str) -> NearbyDevice {
    ConnectionsDevice::new(EndpointId::from(id), Bytes::from_static(b"remote")).into()
}

#[tokio::test]
async fn test_device_connection_lifecycle() {
    let (adapter, _fake, session) = setup();
    let peer = remote("DEV1");
    let (listener, mut events) = DeviceConnectionListener::channel();

    let (cb, rx) = ResultCallback::channel();
    adapter.request_connection(
        &session,
        &peer,
        DeviceConnectionRequestInfo {
            local_device: ConnectionsDevice::new(EndpointId::from("SELF"), Bytes::from_static(b"me"))
                .into(),
            listener,
        },
        ConnectionOptions::default(),
        cb,
    );
    assert_eq!(rx.await.unwrap(), Status::Success);

    match events.recv().await.unwrap() {
        DeviceConnectionEvent::Initiated { device, info } => {
            assert_eq!(&device.endpoint_id, peer.endpoint_id());
            assert_eq!(device.endpoint_info, Bytes::from_static(b"remote-DEV1"));
            assert!(!info.is_incoming_connection);
            assert_eq!(info.authentication_digits.len(), 4);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let (payloads, mut payload_events) = DevicePayloadListener::channel();
    let (cb, rx) = ResultCallback::channel();
    adapter.accept_connection(&session, &peer, payloads, cb);
    assert_eq!(rx.await.unwrap(), Status::Success);
    assert_eq!(
        events.recv().await.unwrap(),
        DeviceConnectionEvent::Result {
            device: ConnectionsDevice::bare(EndpointId::from("DEV1")),
            result: ConnectionResult {
                status: Status::Success
            },
        }
    );

    let (cb, rx) = ResultCallback::channel();
    adapter.initiate_bandwidth_upgrade(&session, &peer, cb);
    assert_eq!(rx.await.unwrap(), Status::Success);
    assert_eq!(
        events.recv().await.unwrap(),
        DeviceConnectionEvent::BandwidthChanged {
            device: ConnectionsDevice::bare(EndpointId::from("DEV1")),
            info: BandwidthInfo {
                quality: Quality::High,
                medium: Medium::WifiLan,
            },
        }
    );

    let (cb, rx) = ResultCallback::channel();
    adapter.send_payload(&session, &peer, Payload::bytes(&b"abc"[..]), cb);
    assert_eq!(rx.await.unwrap(), Status::Success);
    match payload_events.recv().await.unwrap() {
        DevicePayloadEvent::Progress { device, info } => {
            assert_eq!(device.endpoint_id.as_str(), "DEV1");
            assert_eq!(info.total_bytes, 3);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let (cb, rx) = ResultCallback::channel();
    adapter.disconnect(&session, &peer, cb);
    assert_eq!(rx.await.unwrap(), Status::Success);
    assert_eq!(
        events.recv().await.unwrap(),
        DeviceConnectionEvent::Disconnected {
            device: ConnectionsDevice::bare(EndpointId::from("DEV1")),
        }
    );
}

#[tokio::test]
async fn test_adapter_keeps_router_guards() {
    let (adapter, fake, session) = setup();
    let peer = remote("DEV2");

    let request = |listener| {
        let (cb, rx) = ResultCallback::channel();
        adapter.request_connection(
            &session,
            &peer,
            DeviceConnectionRequestInfo {
                local_device: PresenceDevice {
                    endpoint_id: EndpointId::from("SELF"),
                    device_metadata: Bytes::from_static(b"meta"),
                }
                .into(),
                listener,
            },
            ConnectionOptions::default(),
            cb,
        );
        rx
    };

    assert_eq!(
        request(DeviceConnectionListener::noop()).await.unwrap(),
        Status::Success
    );
    assert_eq!(
        request(DeviceConnectionListener::noop()).await.unwrap(),
        Status::AlreadyConnectedToEndpoint
    );

    // Reject preempts and then answers; a later accept is out of order.
    let (cb, rx) = ResultCallback::channel();
    adapter.reject_connection(&session, &peer, cb);
    assert_eq!(rx.await.unwrap(), Status::Success);
    let (cb, rx) = ResultCallback::channel();
    adapter.accept_connection(&session, &peer, DevicePayloadListener::noop(), cb);
    assert_eq!(rx.await.unwrap(), Status::OutOfOrderApiCall);

    assert_eq!(
        fake.count_calls(|c| matches!(c, ControllerCall::RequestConnection { .. })),
        1
    );
}

#[tokio::test]
async fn test_device_listening_reports_incoming() {
    let (adapter, fake, session) = setup();
    let (listener, mut events) = DeviceConnectionListener::channel();

    let status = adapter.start_listening_for_incoming_connections(
        &session,
        "svc",
        listener,
        &ConnectionListeningOptions::default(),
    );
    assert_eq!(status, Status::Success);

    let id = EndpointId::from("INCO");
    fake.simulate_incoming(&session, &id, Bytes::from_static(b"caller"));
    match events.recv().await.unwrap() {
        DeviceConnectionEvent::Initiated { device, info } => {
            assert_eq!(device, ConnectionsDevice::new(id.clone(), Bytes::from_static(b"caller")));
            assert!(info.is_incoming_connection);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(session.has_pending_connection_to_endpoint(&id));

    fake.simulate_remote_response(&session, &id, false);
    assert_eq!(
        events.recv().await.unwrap(),
        DeviceConnectionEvent::Result {
            device: ConnectionsDevice::bare(id),
            result: ConnectionResult {
                status: Status::ConnectionRejected
            },
        }
    );

    adapter.stop_listening_for_incoming_connections(&session);
    assert!(!session.is_listening_for_incoming_connections());
}

#[tokio::test]
async fn test_adapter_forwards_payload_cancel_and_option_updates() {
    let (adapter, fake, session) = setup();
    let peer = remote("DEV3");

    let (cb, rx) = ResultCallback::channel();
    adapter.request_connection(
        &session,
        &peer,
        DeviceConnectionRequestInfo {
            local_device: ConnectionsDevice::new(EndpointId::from("SELF"), Bytes::from_static(b"me"))
                .into(),
            listener: DeviceConnectionListener::noop(),
        },
        ConnectionOptions::default(),
        cb,
    );
    assert_eq!(rx.await.unwrap(), Status::Success);
    let (cb, rx) = ResultCallback::channel();
    adapter.accept_connection(&session, &peer, DevicePayloadListener::noop(), cb);
    assert_eq!(rx.await.unwrap(), Status::Success);

    let payload = Payload::bytes(&b"large file"[..]);
    let payload_id = payload.id();
    let (cb, rx) = ResultCallback::channel();
    adapter.send_payload(&session, &peer, payload, cb);
    assert_eq!(rx.await.unwrap(), Status::Success);

    let (cb, rx) = ResultCallback::channel();
    adapter.cancel_payload(&session, &peer, payload_id, cb);
    assert_eq!(rx.await.unwrap(), Status::Success);
    let (cb, rx) = ResultCallback::channel();
    adapter.cancel_payload(&session, &peer, payload_id, cb);
    assert_eq!(rx.await.unwrap(), Status::PayloadUnknown);

    fake.set_status(FakeOp::UpdateAdvertisingOptions, Status::OutOfOrderApiCall);
    let (cb, rx) = ResultCallback::channel();
    adapter.update_advertising_options(&session, "svc", AdvertisingOptions::default(), cb);
    assert_eq!(rx.await.unwrap(), Status::OutOfOrderApiCall);

    let (cb, rx) = ResultCallback::channel();
    adapter.update_discovery_options(&session, "svc", DiscoveryOptions::default(), cb);
    assert_eq!(rx.await.unwrap(), Status::Success);

    let calls = fake.get_calls();
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, ControllerCall::CancelPayload { payload_id: id } if *id == payload_id))
            .count(),
        2
    );
    assert!(calls.contains(&ControllerCall::UpdateAdvertisingOptions {
        service_id: "svc".to_string()
    }));
    assert!(calls.contains(&ControllerCall::UpdateDiscoveryOptions {
        service_id: "svc".to_string()
    }));
}
