//! NC Core - connection-request routing for nearby connections.
//!
//! This crate implements:
//! - The router: guards plus a single serial task stream over one
//!   transport controller, shared by any number of client sessions
//! - Per-client session state with a lock-free cancellation fast path
//! - The medium bandwidth classifier
//! - A device-centric adapter over the endpoint-id API
//! - A per-client facade with awaitable results

#![forbid(unsafe_code)]

// Routing
pub mod router;
pub mod serializer;
pub mod controller;

// Client state
pub mod session;
pub mod connections;
pub mod device;

// Supporting modules
pub mod errors;
pub mod types;
pub mod medium;
pub mod options;
pub mod payload;
pub mod listener;
pub mod config;

// Test support
pub mod testing;

pub use config::{ConfigError, RouterConfig};
pub use connections::Connections;
pub use controller::TransportController;
pub use device::DeviceAdapter;
pub use errors::{RouterError, Status};
pub use listener::{ConnectionEvent, DiscoveryEvent, Listener, PayloadEvent, ResultCallback};
pub use medium::{classify, Medium, MediumSelector, Quality};
pub use payload::{Payload, PayloadId};
pub use router::Router;
pub use session::{ClientSession, SessionHandle, SessionState};
pub use types::EndpointId;
