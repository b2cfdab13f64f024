//! Client event delivery.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::ConductorEvent;

/// Sends events to the client.
///
/// A failed send means the client went away: the request token is cancelled
/// so in-flight provider reads and tool calls stop.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ConductorEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ConductorEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Deliver one event; returns `false` once the client is gone.
    pub async fn emit(&self, event: ConductorEvent) -> bool {
        if self.tx.send(event).await.is_err() {
            if !self.cancel.is_cancelled() {
                tracing::info!("client disconnected; cancelling request");
                self.cancel.cancel();
            }
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the client has dropped its receiver.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_receiver_cancels_request() {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let sink = EventSink::new(tx, cancel.clone());
        drop(rx);

        let delivered = sink
            .emit(ConductorEvent::Delta {
                content: "x".into(),
                iteration: 1,
            })
            .await;
        assert!(!delivered);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn closed_resolves_when_receiver_drops() {
        let (tx, rx) = mpsc::channel(1);
        let sink = EventSink::new(tx, CancellationToken::new());
        assert!(!sink.is_closed());
        drop(rx);
        sink.closed().await;
        assert!(sink.is_closed());
    }
}
