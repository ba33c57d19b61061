use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use nc_core::{
    listener::{ConnectionListener, DiscoveryListener, PayloadListener},
    medium::Medium,
    testing::FakeController,
    types::{ConnectionRequestInfo, OutOfBandConnectionMetadata},
    ClientSession, ConnectionEvent, Connections, DiscoveryEvent, EndpointId, Payload,
    PayloadEvent, Router, RouterConfig,
};

#[derive(Parser)]
#[command(name = "nc-demo")]
#[command(about = "Drives a scripted connection exchange through the router")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (overrides the configured filter)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Service id to advertise and discover
    #[arg(short, long, default_value = "com.example.nc.demo")]
    service_id: String,

    /// Remote endpoint id to inject and connect to
    #[arg(short, long, default_value = "RMT1")]
    endpoint: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = &args.config {
        RouterConfig::load_from_file(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        RouterConfig::load_from_env()
    };

    let level = args.log_level.clone().unwrap_or_else(|| config.log_filter.clone());
    tracing_subscriber::fmt()
        .with_env_filter(format!("nc_core={},nc_demo={}", level, level))
        .init();

    info!("Starting nc-demo");

    let (controller, fake) = FakeController::boxed();
    let router = Arc::new(Router::with_config(controller, &config)?);
    let client = Connections::new(Arc::clone(&router));
    info!("local endpoint id {}", client.local_endpoint_id());

    let (advertising_listener, advertising_events) = ConnectionListener::channel();
    let printer = tokio::spawn(print_connection_events("advertising", advertising_events));

    client
        .start_advertising(
            &args.service_id,
            &config.advertising,
            ConnectionRequestInfo {
                endpoint_info: Bytes::from_static(b"nc-demo"),
                listener: advertising_listener,
            },
        )
        .await
        .into_result()
        .context("start advertising")?;

    let (discovery_listener, mut discovery_events) = DiscoveryListener::channel();
    client
        .start_discovery(&args.service_id, &config.discovery, discovery_listener)
        .await
        .into_result()
        .context("start discovery")?;

    let remote = EndpointId::from(args.endpoint.as_str());
    client
        .inject_endpoint(
            &args.service_id,
            OutOfBandConnectionMetadata {
                medium: Medium::Bluetooth,
                remote_bluetooth_mac_address: Bytes::from_static(&[0x02, 0x00, 0x5e, 0x10, 0x00, 0x01]),
                endpoint_id: remote.clone(),
                endpoint_info: Bytes::from_static(b"remote-device"),
            },
        )
        .await
        .into_result()
        .context("inject endpoint")?;

    if let Some(DiscoveryEvent::EndpointFound {
        endpoint_id,
        endpoint_info,
        ..
    }) = discovery_events.recv().await
    {
        info!(
            "found {} ({})",
            endpoint_id,
            String::from_utf8_lossy(&endpoint_info)
        );
    }

    let (request_listener, request_events) = ConnectionListener::channel();
    let request_printer = tokio::spawn(print_connection_events("outgoing", request_events));
    client
        .request_connection(
            &remote,
            ConnectionRequestInfo {
                endpoint_info: Bytes::from_static(b"nc-demo"),
                listener: request_listener,
            },
            &config.connection,
        )
        .await
        .into_result()
        .context("request connection")?;

    let (payload_listener, payload_events) = PayloadListener::channel();
    let payload_printer = tokio::spawn(print_payload_events(payload_events));
    client
        .accept_connection(&remote, payload_listener)
        .await
        .into_result()
        .context("accept connection")?;

    client
        .initiate_bandwidth_upgrade(&remote)
        .await
        .into_result()
        .context("bandwidth upgrade")?;

    let payload = Payload::bytes(&b"hello from nc-demo"[..]);
    info!("sending payload {}", payload.id());
    client
        .send_payload(vec![remote.clone()], payload)
        .await
        .into_result()
        .context("send payload")?;

    fake.simulate_payload(client.session(), &remote, Bytes::from_static(b"hello back"));

    client
        .stop_all_endpoints()
        .await
        .into_result()
        .context("stop all endpoints")?;
    if client.session().is_connected_to_endpoint(&remote) {
        warn!("{} still connected after teardown", remote);
    }

    drop(client);
    router.shutdown();
    let stats = router.stats();
    info!(
        "serializer: {} submitted, {} executed, {} discarded",
        stats.submitted, stats.executed, stats.discarded
    );

    // Session reset drops the listener senders, which ends the printers.
    drop(router);
    for task in [printer, request_printer, payload_printer] {
        if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
            warn!("event printer did not finish");
        }
    }

    Ok(())
}

async fn print_connection_events(label: &'static str, mut events: UnboundedReceiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Initiated { endpoint_id, info } => info!(
                "[{}] initiated with {} (token {}, raw {})",
                label,
                endpoint_id,
                info.authentication_token,
                hex::encode(&info.raw_authentication_token)
            ),
            ConnectionEvent::BandwidthChanged {
                endpoint_id,
                medium,
            } => info!(
                "[{}] {} moved to {} ({:?})",
                label,
                endpoint_id,
                medium,
                nc_core::classify(medium)
            ),
            other => info!("[{}] {:?}", label, other),
        }
    }
}

async fn print_payload_events(mut events: UnboundedReceiver<PayloadEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PayloadEvent::Received {
                endpoint_id,
                payload,
            } => info!(
                "received payload {} from {}: {:?}",
                payload.id(),
                endpoint_id,
                payload.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned())
            ),
            PayloadEvent::Progress { endpoint_id, info } => info!(
                "payload {} to {}: {:?} {}/{}",
                info.payload_id, endpoint_id, info.status, info.bytes_transferred, info.total_bytes
            ),
        }
    }
}
