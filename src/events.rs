use serde::Serialize;
use tokio::sync::broadcast;

/// Default capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events published to external collaborators (typically a UI layer).
///
/// This is the entire surface a consumer sees; transport internals are never
/// exposed through it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeskEvent {
    /// Connection established (`true`) or torn down (`false`).
    ConnectionChanged(bool),
    /// A surfaced error with a human-readable message.
    ErrorOccurred(String),
    /// Human-readable status text ("Raising desk...", "Desk height: 72.5 cm").
    StatusChanged(String),
    /// A decoded height reading. `in_range` is `false` for readings outside
    /// the plausible 60-120 cm travel range; such readings are still emitted.
    HeightChanged { cm: f64, in_range: bool },
}

/// Create the event channel a [`crate::DeskController`] publishes to.
pub fn event_channel() -> broadcast::Sender<DeskEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}
