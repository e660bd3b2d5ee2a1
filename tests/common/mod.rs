use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use deskmotion::transport::{
    LinkParts, TransportError, TransportPort, TransportReader, TransportWriter,
};
use deskmotion::DeskEvent;

/// Failure switches and call counters for the mock link's teardown steps.
#[derive(Default)]
pub struct LinkFaults {
    pub fail_writes: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub fail_release: AtomicBool,
    pub fail_close: AtomicBool,
    pub cancel_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
}

/// Test-side handle on a mock link: feed inbound chunks, inspect writes,
/// toggle faults.
pub struct MockHarness {
    pub inbound: mpsc::Sender<Vec<u8>>,
    pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    pub faults: Arc<LinkFaults>,
}

impl MockHarness {
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.writes.lock().expect("writes lock").clone()
    }
}

pub fn mock_link() -> (LinkParts, MockHarness) {
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let writes = Arc::new(Mutex::new(Vec::new()));
    let faults = Arc::new(LinkFaults::default());

    let parts = LinkParts {
        reader: Box::new(MockReader {
            rx: inbound_rx,
            faults: Arc::clone(&faults),
        }),
        writer: Box::new(MockWriter {
            writes: Arc::clone(&writes),
            faults: Arc::clone(&faults),
        }),
        port: Box::new(MockPort {
            faults: Arc::clone(&faults),
        }),
    };
    let harness = MockHarness {
        inbound: inbound_tx,
        writes,
        faults,
    };
    (parts, harness)
}

struct MockReader {
    rx: mpsc::Receiver<Vec<u8>>,
    faults: Arc<LinkFaults>,
}

#[async_trait]
impl TransportReader for MockReader {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.rx.recv().await)
    }

    async fn cancel(&mut self) -> Result<(), TransportError> {
        self.faults.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_cancel.load(Ordering::SeqCst) {
            return Err(TransportError::DeviceError("cancel refused".into()));
        }
        Ok(())
    }
}

struct MockWriter {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    faults: Arc<LinkFaults>,
}

#[async_trait]
impl TransportWriter for MockWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write refused",
            )));
        }
        self.writes.lock().expect("writes lock").push(bytes.to_vec());
        Ok(())
    }

    async fn release(&mut self) -> Result<(), TransportError> {
        self.faults.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_release.load(Ordering::SeqCst) {
            return Err(TransportError::DeviceError("release refused".into()));
        }
        Ok(())
    }
}

struct MockPort {
    faults: Arc<LinkFaults>,
}

#[async_trait]
impl TransportPort for MockPort {
    async fn close(&mut self) -> Result<(), TransportError> {
        self.faults.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::DeviceError("close refused".into()));
        }
        Ok(())
    }
}

/// Await the next event with a bounded wait.
pub async fn next_event(rx: &mut broadcast::Receiver<DeskEvent>) -> DeskEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Drain every event currently queued.
pub fn drain_events(rx: &mut broadcast::Receiver<DeskEvent>) -> Vec<DeskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
