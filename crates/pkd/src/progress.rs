//! Progress sinks.
//!
//! Both sinks are fire-and-forget: a full or closed channel drops the event
//! and processing carries on.

use pkd_core::{ProgressEvent, ProgressSink};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn notify(&self, event: ProgressEvent) {
        info!(
            upload_id = %event.upload_id,
            stage = %event.stage,
            processed = event.processed,
            total = ?event.total,
            message = event.message.as_deref().unwrap_or(""),
            "progress"
        );
    }
}

/// Forwards events into a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgress {
    /// Sink plus the receiving end, buffering up to `capacity` events.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Wrap an existing sender.
    #[must_use]
    pub const fn new(sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelProgress {
    fn notify(&self, event: ProgressEvent) {
        if let Err(e) = self.sender.try_send(event) {
            debug!(error = %e, "progress event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkd_core::Stage;

    #[test]
    fn channel_delivers_in_order() {
        let (sink, mut rx) = ChannelProgress::channel(8);
        sink.notify(ProgressEvent::new("u", Stage::Parsing, 0, None));
        sink.notify(ProgressEvent::new("u", Stage::Completed, 3, Some(3)));

        assert_eq!(rx.try_recv().unwrap().stage, Stage::Parsing);
        assert_eq!(rx.try_recv().unwrap().stage, Stage::Completed);
    }

    #[test]
    fn full_or_closed_channel_is_ignored() {
        let (sink, rx) = ChannelProgress::channel(1);
        sink.notify(ProgressEvent::new("u", Stage::Parsing, 0, None));
        sink.notify(ProgressEvent::new("u", Stage::Parsing, 1, None));
        drop(rx);
        sink.notify(ProgressEvent::new("u", Stage::Completed, 2, None));
    }

    #[test]
    fn tracing_sink_accepts_events() {
        TracingProgress.notify(
            ProgressEvent::new("u", Stage::Failed, 0, None).with_message("bad magic"),
        );
    }
}
