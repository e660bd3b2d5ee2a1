use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::link::{LinkParts, TransportPort, TransportReader, TransportWriter};
use super::{serial, Result, SessionConfig, SessionState, TransportError, DISCONNECT_GRACE};

const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Inbound byte-chunk stream of a session: infinite, in arrival order, not
/// restartable. Terminates when the underlying link closes or is cancelled.
pub struct ChunkStream {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChunkStream {
    /// Await the next chunk; `None` once the stream has terminated.
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

impl Stream for ChunkStream {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// An open serial connection: owns the link halves, their lifecycle, and the
/// inbound read loop. Protocol code only queries connection state through
/// [`Session::is_open`]; it never drives transitions itself.
pub struct Session {
    state_tx: watch::Sender<SessionState>,
    writer: Mutex<Option<Box<dyn TransportWriter>>>,
    reader: Arc<Mutex<Option<Box<dyn TransportReader>>>>,
    port: Mutex<Option<Box<dyn TransportPort>>>,
    chunks: StdMutex<Option<ChunkStream>>,
    read_task: StdMutex<Option<JoinHandle<()>>>,
    read_fault: Arc<StdMutex<Option<String>>>,
}

impl Session {
    /// Open the configured serial port and start the inbound read loop.
    ///
    /// Fails with `CapabilityUnavailable` when the host has no serial stack and
    /// `DeviceError` on hardware or permission failure. Neither is retried.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let parts = serial::open_link(config)?;
        Ok(Self::from_parts(parts))
    }

    /// Build a session over an already-open transport link. This is the seam
    /// for non-serial links and for exercising the session against a mock.
    pub fn from_parts(parts: LinkParts) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let reader = Arc::new(Mutex::new(Some(parts.reader)));
        let read_fault = Arc::new(StdMutex::new(None));

        let task = tokio::spawn(read_loop(
            Arc::clone(&reader),
            state_rx,
            chunk_tx,
            Arc::clone(&read_fault),
        ));
        state_tx.send_replace(SessionState::Connected);

        Self {
            state_tx,
            writer: Mutex::new(Some(parts.writer)),
            reader,
            port: Mutex::new(Some(parts.port)),
            chunks: StdMutex::new(Some(ChunkStream { rx: chunk_rx })),
            read_task: StdMutex::new(Some(task)),
            read_fault,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Take the inbound chunk stream. Yields `None` after the first call; the
    /// stream is not restartable.
    pub fn read_stream(&self) -> Option<ChunkStream> {
        self.chunks.lock().ok()?.take()
    }

    /// Error message recorded by the read loop when it died on a transport
    /// fault while the session was still connected.
    pub fn take_read_fault(&self) -> Option<String> {
        self.read_fault.lock().ok()?.take()
    }

    /// Write exactly `bytes.len()` bytes to the device.
    pub async fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        writer.write_all(bytes).await
    }

    /// Close the session. Flips the state flag first so the read loop exits,
    /// waits out the grace period, then attempts reader-cancel, writer-release
    /// and port-close independently. A failing step is logged and skipped, not
    /// allowed to block the remaining steps: disconnection always ends in
    /// `Disconnected`.
    pub async fn close(&self) -> Result<()> {
        // close() during Connecting waits for the open to resolve.
        let mut rx = self.state_tx.subscribe();
        while *rx.borrow() == SessionState::Connecting {
            if rx.changed().await.is_err() {
                break;
            }
        }

        if self.state() == SessionState::Disconnected {
            return Ok(());
        }

        self.state_tx.send_replace(SessionState::Disconnecting);
        tokio::time::sleep(DISCONNECT_GRACE).await;

        if let Some(mut reader) = self.reader.lock().await.take() {
            if let Err(e) = reader.cancel().await {
                log::debug!("Reader cancel during teardown (expected): {e}");
            }
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.release().await {
                log::debug!("Writer release during teardown (expected): {e}");
            }
        }
        if let Some(mut port) = self.port.lock().await.take() {
            if let Err(e) = port.close().await {
                log::debug!("Port close during teardown (expected): {e}");
            }
        }
        if let Some(task) = self.read_task.lock().ok().and_then(|mut t| t.take()) {
            task.abort();
        }

        self.state_tx.send_replace(SessionState::Disconnected);
        log::info!("Session disconnected");
        Ok(())
    }
}

/// Cooperative read loop: awaits the next chunk, forwards it, and exits once
/// the session leaves `Connected` or the link ends.
async fn read_loop(
    reader: Arc<Mutex<Option<Box<dyn TransportReader>>>>,
    mut state_rx: watch::Receiver<SessionState>,
    chunk_tx: mpsc::Sender<Vec<u8>>,
    read_fault: Arc<StdMutex<Option<String>>>,
) {
    log::debug!("Receive loop started");
    loop {
        let connected = matches!(
            *state_rx.borrow(),
            SessionState::Connected | SessionState::Connecting
        );
        if !connected {
            break;
        }

        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            read = next_chunk(&reader) => {
                match read {
                    Ok(Some(chunk)) if !chunk.is_empty() => {
                        if chunk_tx.send(chunk).await.is_err() {
                            // Consumer gone; nothing left to feed.
                            break;
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        log::debug!("Receive stream ended");
                        break;
                    }
                    Err(e) => {
                        if *state_rx.borrow() == SessionState::Connected {
                            log::error!("Receive failed: {e}");
                            if let Ok(mut fault) = read_fault.lock() {
                                *fault = Some(e.to_string());
                            }
                        }
                        break;
                    }
                }
            }
        }
    }
    log::debug!("Receive loop exited");
}

async fn next_chunk(
    reader: &Arc<Mutex<Option<Box<dyn TransportReader>>>>,
) -> Result<Option<Vec<u8>>> {
    let mut guard = reader.lock().await;
    match guard.as_mut() {
        Some(r) => r.next_chunk().await,
        None => Ok(None),
    }
}
