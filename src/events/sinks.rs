use crate::events::{EventSink, ProgressEvent, StatusEvent};
use crate::state::{BatchStatus, ItemStatus};
use tokio::sync::broadcast;

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_progress(&self, event: &ProgressEvent) {
        match event.status {
            ItemStatus::Failed => tracing::error!(
                "[{}/{}] {} (#{}) {}",
                event.current,
                event.total,
                event.item.slug,
                event.item.source_id,
                event.status
            ),
            _ => tracing::info!(
                "[{}/{}] {} (#{}) {}",
                event.current,
                event.total,
                event.item.slug,
                event.item.source_id,
                event.status
            ),
        }
    }

    fn on_status(&self, event: &StatusEvent) {
        match event.status {
            BatchStatus::Failed => tracing::error!("{}", event.message),
            BatchStatus::Cancelled | BatchStatus::Empty => tracing::warn!("{}", event.message),
            _ => tracing::info!("{}", event.message),
        }
    }
}

/// Either kind of event, as carried by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestEvent {
    Progress(ProgressEvent),
    Status(StatusEvent),
}

/// Forwards events into a broadcast channel
///
/// Sending never blocks; with no live receivers the event is dropped, and a
/// receiver that falls more than `capacity` events behind sees `Lagged`.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: broadcast::Sender<HarvestEvent>,
}

impl ChannelSink {
    /// Create a new ChannelSink with default capacity (256 events).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ChannelSink {
    fn on_progress(&self, event: &ProgressEvent) {
        // Ignore send errors (no active receivers)
        let _ = self.sender.send(HarvestEvent::Progress(event.clone()));
    }

    fn on_status(&self, event: &StatusEvent) {
        let _ = self.sender.send(HarvestEvent::Status(event.clone()));
    }
}
