pub mod link;
pub mod serial;
pub mod session;

pub use link::{LinkParts, TransportPort, TransportReader, TransportWriter};
pub use session::{ChunkStream, Session};

use std::time::Duration;

use serde::Serialize;

// Loctek control boxes speak fixed 9600 baud, 8 data bits, 1 stop bit, no parity.
pub const BAUD_RATE: u32 = 9600;
pub const DATA_BITS: tokio_serial::DataBits = tokio_serial::DataBits::Eight;
pub const STOP_BITS: tokio_serial::StopBits = tokio_serial::StopBits::One;
pub const PARITY: tokio_serial::Parity = tokio_serial::Parity::None;

/// Grace period between flipping the state flag and tearing down the link,
/// letting the read loop finish its current iteration.
pub const DISCONNECT_GRACE: Duration = Duration::from_millis(100);

/// Connection lifecycle of a [`Session`].
///
/// Transitions: `Disconnected --open--> Connecting --success--> Connected`,
/// `Connecting --failure--> Disconnected`,
/// `Connected --close--> Disconnecting --> Disconnected`. No transition skips
/// states; `close()` issued during Connecting waits for it to resolve first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Configuration for opening a serial session.
///
/// Baud rate and framing are fixed by the device and deliberately not part of
/// the config.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub port_name: String,
}

impl SessionConfig {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Reserved for hosts that gate serial access behind a privileged or
    /// secure execution context.
    #[error("Secure execution context required")]
    InsecureContext,

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
