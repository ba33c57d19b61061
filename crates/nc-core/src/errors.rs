//! Result codes reported to callers of the router.
//!
//! Every router operation terminates by completing its callback with a
//! [`Status`]. Guard violations are detected locally; statuses produced by
//! the transport controller are passed through unchanged.

/// Result code of a router operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation completed
    #[default]
    Success,
    /// Malformed input or an unspecified failure
    Error,
    /// Operation called in a state that does not permit it
    OutOfOrderApiCall,
    /// A different strategy is already active on this client
    AlreadyHaveActiveStrategy,
    /// Client is already advertising
    AlreadyAdvertising,
    /// Client is already discovering
    AlreadyDiscovering,
    /// Client is already listening for incoming connections
    AlreadyListening,
    /// I/O failure while talking to the endpoint
    EndpointIoError,
    /// Target endpoint has no connected relation
    EndpointUnknown,
    /// Remote or local side rejected the connection
    ConnectionRejected,
    /// Endpoint already has a pending or connected relation
    AlreadyConnectedToEndpoint,
    /// Endpoint is not connected
    NotConnectedToEndpoint,
    /// Bluetooth radio failure
    BluetoothError,
    /// BLE radio failure
    BleError,
    /// Wi-Fi LAN failure
    WifiLanError,
    /// No payload with the given id is known
    PayloadUnknown,
    /// Connection was reset
    Reset,
    /// Operation timed out inside the transport
    Timeout,
}

impl Status {
    /// True only for [`Status::Success`].
    pub fn is_ok(self) -> bool {
        self == Status::Success
    }

    /// Convert into a `Result`, keeping the failing code as the error.
    pub fn into_result(self) -> Result<(), Status> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Status::Success => "success",
            Status::Error => "error",
            Status::OutOfOrderApiCall => "out of order api call",
            Status::AlreadyHaveActiveStrategy => "already have active strategy",
            Status::AlreadyAdvertising => "already advertising",
            Status::AlreadyDiscovering => "already discovering",
            Status::AlreadyListening => "already listening",
            Status::EndpointIoError => "endpoint io error",
            Status::EndpointUnknown => "endpoint unknown",
            Status::ConnectionRejected => "connection rejected",
            Status::AlreadyConnectedToEndpoint => "already connected to endpoint",
            Status::NotConnectedToEndpoint => "not connected to endpoint",
            Status::BluetoothError => "bluetooth error",
            Status::BleError => "ble error",
            Status::WifiLanError => "wifi lan error",
            Status::PayloadUnknown => "payload unknown",
            Status::Reset => "reset",
            Status::Timeout => "timeout",
        };
        f.write_str(text)
    }
}

impl std::error::Error for Status {}

/// Failure to bring up a router.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("failed to spawn serializer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_success_is_ok() {
        assert!(Status::Success.is_ok());
        assert!(!Status::Error.is_ok());
        assert!(!Status::AlreadyConnectedToEndpoint.is_ok());
        assert_eq!(Status::default(), Status::Success);
    }

    #[test]
    fn test_into_result() {
        assert_eq!(Status::Success.into_result(), Ok(()));
        assert_eq!(
            Status::OutOfOrderApiCall.into_result(),
            Err(Status::OutOfOrderApiCall)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::EndpointUnknown.to_string(), "endpoint unknown");
    }
}
