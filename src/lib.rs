pub mod events;
pub mod protocol;
pub mod transport;

pub use events::DeskEvent;
pub use protocol::commands::Command;
pub use protocol::engine::{DeskController, EngineOptions};
pub use protocol::frame::{decode_chunk, FrameDecoder, HeightReading, StatusFrame};
pub use protocol::ProtocolError;
pub use transport::session::{ChunkStream, Session};
pub use transport::{SessionConfig, SessionState, TransportError};
