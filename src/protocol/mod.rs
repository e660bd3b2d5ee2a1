pub mod commands;
pub mod engine;
pub mod frame;

pub use commands::Command;
pub use engine::{DeskController, EngineOptions};
pub use frame::{decode_chunk, FrameDecoder, HeightReading, StatusFrame};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Desk not connected")]
    NotConnected,

    #[error("Desk already connected")]
    AlreadyConnected,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
