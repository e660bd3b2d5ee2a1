use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::commands::Command;
use super::frame::FrameDecoder;
use super::{ProtocolError, Result};
use crate::events::{event_channel, DeskEvent};
use crate::transport::{ChunkStream, LinkParts, Session, SessionConfig};

/// Cadence of the continuous-send job. Picked to respect the command rate the
/// control box accepts; a tighter interval risks frame corruption on the wire
/// or a receive-buffer overrun on the echo side.
pub const COMMAND_INTERVAL: Duration = Duration::from_millis(108);

/// Fixed settle delay between connecting and sending the wake-up frame.
pub const WAKE_UP_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on the post-stop receive-buffer flush.
pub const FLUSH_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Buffer inbound bytes across chunk boundaries and recover split frames.
    /// Off by default: the reference behavior decodes each chunk on its own.
    pub reassemble_frames: bool,
}

struct ActiveLink {
    session: Arc<Session>,
    flush_tx: mpsc::Sender<()>,
    decode_task: JoinHandle<()>,
}

struct ContinuousJob {
    command: Command,
    generation: u64,
    handle: JoinHandle<()>,
}

/// Protocol engine for one desk: encodes commands, paces continuous motion,
/// and turns inbound frames into [`DeskEvent`]s.
///
/// One controller drives at most one session at a time; it is not a process
/// singleton, so independent desks get independent controllers.
pub struct DeskController {
    options: EngineOptions,
    events: broadcast::Sender<DeskEvent>,
    link: Mutex<Option<ActiveLink>>,
    job: Arc<Mutex<Option<ContinuousJob>>>,
    job_seq: AtomicU64,
}

impl DeskController {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            options,
            events: event_channel(),
            link: Mutex::new(None),
            job: Arc::new(Mutex::new(None)),
            job_seq: AtomicU64::new(0),
        }
    }

    /// Subscribe to the controller's event stream. May be called before
    /// connecting; every subscriber sees every event from then on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeskEvent> {
        self.events.subscribe()
    }

    /// Open the configured serial port and attach to it.
    pub async fn connect(&self, config: &SessionConfig) -> Result<()> {
        {
            let link = self.link.lock().await;
            if link.is_some() {
                return Err(ProtocolError::AlreadyConnected);
            }
        }
        let session = Session::open(config).map_err(|e| {
            self.report_error(format!("Connection failed: {e}"));
            ProtocolError::from(e)
        })?;
        self.install(session).await
    }

    /// Attach to an already-open transport link (bridges, tests).
    pub async fn connect_with(&self, parts: LinkParts) -> Result<()> {
        {
            let link = self.link.lock().await;
            if link.is_some() {
                return Err(ProtocolError::AlreadyConnected);
            }
        }
        self.install(Session::from_parts(parts)).await
    }

    async fn install(&self, session: Session) -> Result<()> {
        let session = Arc::new(session);
        let stream = session
            .read_stream()
            .ok_or(ProtocolError::AlreadyConnected)?;

        let (flush_tx, flush_rx) = mpsc::channel(4);
        let decoder = if self.options.reassemble_frames {
            FrameDecoder::reassembling()
        } else {
            FrameDecoder::new()
        };
        let decode_task = tokio::spawn(decode_loop(
            stream,
            flush_rx,
            self.events.clone(),
            Arc::clone(&session),
            decoder,
        ));

        {
            let mut link = self.link.lock().await;
            if link.is_some() {
                decode_task.abort();
                return Err(ProtocolError::AlreadyConnected);
            }
            *link = Some(ActiveLink {
                session: Arc::clone(&session),
                flush_tx,
                decode_task,
            });
        }

        let _ = self.events.send(DeskEvent::ConnectionChanged(true));
        self.emit_status("Connected to desk");
        log::info!("Connected to desk");

        // The control box only broadcasts height telemetry while its display
        // is active; send the wake-up frame once the firmware has settled.
        let events = self.events.clone();
        let wake_session = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(WAKE_UP_DELAY).await;
            if !wake_session.is_open() {
                return;
            }
            match wake_session.write(&Command::WakeUp.frame()).await {
                Ok(()) => log::debug!("Wake-up command sent"),
                Err(e) => {
                    log::warn!("Wake-up command failed: {e}");
                    let _ = events.send(DeskEvent::ErrorOccurred(format!(
                        "Wake-up command failed: {e}"
                    )));
                }
            }
        });

        Ok(())
    }

    /// Stop any motion, close the session, and detach. Idempotent; teardown
    /// failures inside the session are swallowed per step, so this always
    /// leaves the controller disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        self.stop_continuous().await;

        let link = { self.link.lock().await.take() };
        let Some(link) = link else {
            return Ok(());
        };

        if let Err(e) = link.session.close().await {
            log::warn!("Session close reported: {e}");
        }
        // The decode task ends with the chunk stream; make sure it is gone
        // before reporting the disconnect.
        link.decode_task.abort();
        let _ = link.decode_task.await;

        let _ = self.events.send(DeskEvent::ConnectionChanged(false));
        self.emit_status("Disconnected from desk");
        log::info!("Disconnected from desk");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        let link = self.link.lock().await;
        link.as_ref().is_some_and(|l| l.session.is_open())
    }

    pub async fn is_moving(&self) -> bool {
        self.job.lock().await.is_some()
    }

    /// Send a single command frame. No retry: transport failures surface
    /// directly, and repetition policy stays with the caller.
    pub async fn send(&self, command: Command) -> Result<()> {
        let session = {
            let link = self.link.lock().await;
            match link.as_ref() {
                Some(l) if l.session.is_open() => Arc::clone(&l.session),
                _ => {
                    self.report_error(format!("Cannot send {command}: desk not connected"));
                    return Err(ProtocolError::NotConnected);
                }
            }
        };
        send_frame(&session, &self.events, command).await
    }

    /// Resolve a wire name against the static table, then send.
    pub async fn send_named(&self, name: &str) -> Result<()> {
        let command = Command::from_name(name).map_err(|e| {
            self.report_error(e.to_string());
            e
        })?;
        self.send(command).await
    }

    /// Send a preset recall command and report the target as status text.
    pub async fn send_preset(&self, command: Command) -> Result<()> {
        self.send(command).await?;
        if command.is_preset() {
            self.emit_status(&format!("Moving to {}...", preset_label(command)));
        }
        Ok(())
    }

    /// Start repeating `command` every [`COMMAND_INTERVAL`], beginning with an
    /// immediate send. A job that is already running is fully stopped before
    /// the new one sends its first frame; at most one job exists at a time.
    /// Any write failure inside the loop stops that job only.
    pub async fn start_continuous(&self, command: Command) -> Result<()> {
        let (session, flush_tx) = {
            let link = self.link.lock().await;
            match link.as_ref() {
                Some(l) if l.session.is_open() => {
                    (Arc::clone(&l.session), l.flush_tx.clone())
                }
                _ => {
                    self.report_error(format!(
                        "Cannot start continuous {command}: desk not connected"
                    ));
                    return Err(ProtocolError::NotConnected);
                }
            }
        };

        let mut slot = self.job.lock().await;
        if let Some(job) = slot.take() {
            stop_job(job, &flush_tx).await;
            self.emit_status("Desk movement stopped");
        }

        let generation = self.job_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = tokio::spawn(continuous_loop(
            command,
            generation,
            session,
            self.events.clone(),
            Arc::clone(&self.job),
            flush_tx,
        ));
        *slot = Some(ContinuousJob {
            command,
            generation,
            handle,
        });
        drop(slot);

        log::info!("Continuous {command} started");
        self.emit_status(match command {
            Command::Up => "Raising desk...",
            Command::Down => "Lowering desk...",
            _ => "Repeating command...",
        });
        Ok(())
    }

    /// Stop the active continuous-send job, if any, and flush the telemetry
    /// backlog accumulated during motion. Idempotent: with no active job this
    /// does nothing.
    pub async fn stop_continuous(&self) {
        let job = { self.job.lock().await.take() };
        let Some(job) = job else {
            return;
        };

        let flush_tx = {
            let link = self.link.lock().await;
            link.as_ref().map(|l| l.flush_tx.clone())
        };
        let command = job.command;
        match flush_tx {
            Some(flush_tx) => stop_job(job, &flush_tx).await,
            None => {
                job.handle.abort();
                let _ = job.handle.await;
            }
        }
        log::info!("Continuous {command} stopped");
        self.emit_status("Desk movement stopped");
    }

    fn emit_status(&self, text: &str) {
        let _ = self.events.send(DeskEvent::StatusChanged(text.to_string()));
    }

    fn report_error(&self, message: String) {
        log::error!("{message}");
        let _ = self.events.send(DeskEvent::ErrorOccurred(message));
    }
}

impl Default for DeskController {
    fn default() -> Self {
        Self::new()
    }
}

fn preset_label(command: Command) -> &'static str {
    match command {
        Command::Preset1 => "preset 1",
        Command::Preset2 => "preset 2",
        Command::Sitting => "sitting position",
        Command::Standing => "standing position",
        _ => "target position",
    }
}

/// Cancel the job's timer task and wait for it to finish, then request the
/// receive-buffer flush. The successor job (if any) must not send before this
/// returns.
async fn stop_job(job: ContinuousJob, flush_tx: &mpsc::Sender<()>) {
    job.handle.abort();
    let _ = job.handle.await;
    let _ = flush_tx.send(()).await;
}

async fn send_frame(
    session: &Session,
    events: &broadcast::Sender<DeskEvent>,
    command: Command,
) -> Result<()> {
    let frame = command.frame();
    match session.write(&frame).await {
        Ok(()) => {
            log::debug!("Sent {command}: {frame:02X?}");
            Ok(())
        }
        Err(e) => {
            log::error!("Failed to send {command}: {e}");
            let _ = events.send(DeskEvent::ErrorOccurred(format!(
                "Failed to send {command}: {e}"
            )));
            Err(ProtocolError::from(e))
        }
    }
}

/// Timer-driven repetition of a single motion command. The first tick fires
/// immediately; a write failure auto-stops this job without touching the
/// session.
async fn continuous_loop(
    command: Command,
    generation: u64,
    session: Arc<Session>,
    events: broadcast::Sender<DeskEvent>,
    job: Arc<Mutex<Option<ContinuousJob>>>,
    flush_tx: mpsc::Sender<()>,
) {
    let mut ticker = tokio::time::interval(COMMAND_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if send_frame(&session, &events, command).await.is_err() {
            log::warn!("Continuous {command} auto-stopped after send failure");
            {
                let mut slot = job.lock().await;
                if matches!(slot.as_ref(), Some(j) if j.generation == generation) {
                    slot.take();
                }
            }
            let _ = flush_tx.send(()).await;
            let _ = events.send(DeskEvent::StatusChanged("Desk movement stopped".to_string()));
            break;
        }
    }
}

/// Decode task: turns inbound chunks into height/status events and services
/// flush requests after motion stops.
async fn decode_loop(
    mut stream: ChunkStream,
    mut flush_rx: mpsc::Receiver<()>,
    events: broadcast::Sender<DeskEvent>,
    session: Arc<Session>,
    mut decoder: FrameDecoder,
) {
    loop {
        tokio::select! {
            Some(()) = flush_rx.recv() => {
                drain_backlog(&mut stream).await;
                decoder.reset();
            }
            chunk = stream.next() => {
                match chunk {
                    Some(chunk) => handle_chunk(&mut decoder, &chunk, &events),
                    None => {
                        if session.is_open() {
                            let detail = session
                                .take_read_fault()
                                .unwrap_or_else(|| "receive stream closed unexpectedly".to_string());
                            let _ = events.send(DeskEvent::ErrorOccurred(format!(
                                "Receive error: {detail}"
                            )));
                        }
                        break;
                    }
                }
            }
        }
    }
    log::debug!("Decode task exited");
}

fn handle_chunk(decoder: &mut FrameDecoder, chunk: &[u8], events: &broadcast::Sender<DeskEvent>) {
    for frame in decoder.push_chunk(chunk) {
        let Some(height) = frame.height else {
            // Zero height word: no telemetry yet, commonly right after
            // connect before wake-up has taken effect.
            log::debug!("Status frame without height (type {:02X})", frame.frame_type);
            continue;
        };
        let in_range = height.is_plausible();
        if !in_range {
            log::warn!("Height {:.1} cm outside plausible travel range", height.cm);
        }
        let _ = events.send(DeskEvent::HeightChanged {
            cm: height.cm,
            in_range,
        });
        let _ = events.send(DeskEvent::StatusChanged(format!(
            "Desk height: {:.1} cm",
            height.cm
        )));
    }
}

/// Drain and discard queued inbound chunks until the flush window elapses or
/// the stream yields nothing more. The deadline bounds the flush so it can
/// never hang the caller.
async fn drain_backlog(stream: &mut ChunkStream) {
    let deadline = tokio::time::Instant::now() + FLUSH_WINDOW;
    let mut discarded = 0usize;
    loop {
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(chunk)) => discarded += chunk.len(),
            Ok(None) | Err(_) => break,
        }
    }
    if discarded > 0 {
        log::debug!("Flushed {discarded} stale telemetry bytes");
    }
}
