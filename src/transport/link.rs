use async_trait::async_trait;

use super::Result;

/// Receiving half of an open transport link.
#[async_trait]
pub trait TransportReader: Send + 'static {
    /// Await the next chunk of received bytes. `Ok(None)` means the underlying
    /// stream has ended. Chunks may be empty on some backends; callers skip
    /// empty chunks.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    /// Best-effort cancellation of a pending read during teardown. Failures
    /// here are expected (already cancelled, already closed) and are swallowed
    /// by the session.
    async fn cancel(&mut self) -> Result<()>;
}

/// Sending half of an open transport link.
#[async_trait]
pub trait TransportWriter: Send + 'static {
    /// Write exactly `bytes.len()` bytes.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Release write access during teardown.
    async fn release(&mut self) -> Result<()>;
}

/// Handle on the underlying device, closed last during teardown.
#[async_trait]
pub trait TransportPort: Send + 'static {
    async fn close(&mut self) -> Result<()>;
}

/// The three pieces of an open link, handed to [`super::Session`].
pub struct LinkParts {
    pub reader: Box<dyn TransportReader>,
    pub writer: Box<dyn TransportWriter>,
    pub port: Box<dyn TransportPort>,
}
