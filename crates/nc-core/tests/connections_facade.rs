//! Integration tests for the per-client facade.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;

use nc_core::{
    listener::{ConnectionListener, DiscoveryListener, PayloadListener},
    options::{AdvertisingOptions, ConnectionOptions, DiscoveryOptions},
    testing::{ControllerCall, FakeController, FakeHandle},
    types::{ConnectionRequestInfo, ENDPOINT_ID_LENGTH},
    ClientSession, ConnectionEvent, Connections, EndpointId, Payload, PayloadEvent, Router,
    RouterConfig, Status,
};

fn setup() -> (Arc<Router>, FakeHandle) {
    let (controller, fake) = FakeController::boxed();
    let config = RouterConfig {
        serializer_thread_name: "facade-test".to_string(),
        ..Default::default()
    };
    let router = Router::with_config(controller, &config).unwrap();
    (Arc::new(router), fake)
}

fn request_info(
    name: &'static [u8],
) -> (ConnectionRequestInfo, UnboundedReceiver<ConnectionEvent>) {
    let (listener, rx) = ConnectionListener::channel();
    (
        ConnectionRequestInfo {
            endpoint_info: Bytes::from_static(name),
            listener,
        },
        rx,
    )
}

#[tokio::test]
async fn test_facade_flow() {
    let (router, _fake) = setup();
    let client = Connections::new(Arc::clone(&router));
    assert_eq!(client.local_endpoint_id().len(), ENDPOINT_ID_LENGTH);

    let (info, _adv) = request_info(b"phone");
    assert_eq!(
        client
            .start_advertising("svc", &AdvertisingOptions::default(), info)
            .await,
        Status::Success
    );
    assert_eq!(
        client
            .start_discovery("svc", &DiscoveryOptions::default(), DiscoveryListener::noop())
            .await,
        Status::Success
    );

    let peer = EndpointId::from("PEER");
    let (info, mut events) = request_info(b"phone");
    assert_eq!(
        client
            .request_connection(&peer, info, &ConnectionOptions::default())
            .await,
        Status::Success
    );
    let (payloads, mut received) = PayloadListener::channel();
    assert_eq!(client.accept_connection(&peer, payloads).await, Status::Success);
    assert!(matches!(events.recv().await, Some(ConnectionEvent::Initiated { .. })));
    assert!(matches!(events.recv().await, Some(ConnectionEvent::Accepted { .. })));

    assert_eq!(
        client
            .send_payload(vec![peer.clone()], Payload::bytes(&b"ping"[..]))
            .await,
        Status::Success
    );
    assert!(matches!(
        received.recv().await,
        Some(PayloadEvent::Progress { .. })
    ));

    assert_eq!(client.initiate_bandwidth_upgrade(&peer).await, Status::Success);
    assert_eq!(client.cancel_payload(-1).await, Status::PayloadUnknown);
    assert_eq!(client.set_custom_save_path("/tmp/nc").await, Status::Success);

    assert_eq!(client.stop_all_endpoints().await, Status::Success);
    assert!(!client.session().is_advertising());
    assert!(!client.session().is_discovering());
    assert!(!client.session().is_connected_to_endpoint(&peer));
}

#[tokio::test]
async fn test_facade_reports_guards() {
    let (router, _fake) = setup();
    let client = Connections::new(router);

    assert_eq!(client.stop_advertising().await, Status::Success);
    assert_eq!(client.stop_discovery().await, Status::Success);
    assert_eq!(
        client.disconnect_from_endpoint(&EndpointId::from("NONE")).await,
        Status::OutOfOrderApiCall
    );
    assert_eq!(
        client.reject_connection(&EndpointId::from("NONE")).await,
        Status::Success
    );
    assert_eq!(
        client
            .update_discovery_options("svc", &DiscoveryOptions::default())
            .await,
        Status::Success
    );
    assert_eq!(
        client
            .update_advertising_options("svc", &AdvertisingOptions::default())
            .await,
        Status::Success
    );
}

#[tokio::test]
async fn test_dropping_facade_tears_down_session() {
    let (router, fake) = setup();
    let client = Connections::new(Arc::clone(&router));
    let peer = EndpointId::from("GONE");
    let (info, _events) = request_info(b"laptop");
    assert_eq!(
        client
            .request_connection(&peer, info, &ConnectionOptions::default())
            .await,
        Status::Success
    );
    let session = Arc::clone(client.session());

    drop(client);
    assert!(fake.wait_for_call(
        |c| matches!(c, ControllerCall::ShutdownBwuExecutors),
        Duration::from_secs(5)
    ));
    assert!(fake
        .get_calls()
        .contains(&ControllerCall::DisconnectFromEndpoint { endpoint_id: peer.clone() }));
    // Shutdown waits for the teardown task, reset included.
    router.shutdown();
    assert!(!session.has_pending_connection_to_endpoint(&peer));
}

#[tokio::test]
async fn test_calls_after_shutdown_report_error() {
    let (router, fake) = setup();
    let client = Connections::new(Arc::clone(&router));
    router.shutdown();

    assert!(fake.is_stopped());
    assert_eq!(client.stop_advertising().await, Status::Error);
    assert_eq!(
        client
            .start_discovery("svc", &DiscoveryOptions::default(), DiscoveryListener::noop())
            .await,
        Status::Error
    );
}
