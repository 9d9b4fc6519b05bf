use crate::actors::channels::send_or_drop;
use crate::actors::messages::GatewayMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::Sender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

struct Viewer {
    id: u64,
    outbound: Sender<GatewayMessage>,
    closed: CancellationToken,
}

/// Holds at most one live viewer. Installing a new one closes the old one.
pub struct ConnectionSlot {
    name: String,
    current: Mutex<Option<Viewer>>,
    next_id: AtomicU64,
}

impl ConnectionSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Makes this viewer current and returns its id.
    pub async fn install(&self, outbound: Sender<GatewayMessage>, closed: CancellationToken) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let displaced = self.current.lock().await.replace(Viewer {
            id,
            outbound,
            closed,
        });

        match displaced {
            Some(old) => {
                tracing::info!(gateway = %self.name, old = old.id, new = id, "Viewer replaced");
                old.closed.cancel();
            }
            None => tracing::info!(gateway = %self.name, id, "Viewer connected"),
        }
        id
    }

    /// Clears the slot if `id` still owns it.
    pub async fn release(&self, id: u64) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|viewer| viewer.id == id) {
            *current = None;
            tracing::info!(gateway = %self.name, id, "Viewer disconnected");
        }
    }

    pub async fn clear(&self) {
        if let Some(viewer) = self.current.lock().await.take() {
            viewer.closed.cancel();
        }
    }

    pub async fn current_id(&self) -> Option<u64> {
        self.current.lock().await.as_ref().map(|viewer| viewer.id)
    }

    /// Sends to the current viewer; returns false when dropped.
    pub async fn deliver(&self, message: GatewayMessage) -> bool {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(viewer) => send_or_drop(&viewer.outbound, message, &format!("{}->viewer", self.name)),
            None => {
                tracing::info!(gateway = %self.name, "No viewer connected, message dropped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::channel;

    #[tokio::test]
    async fn test_new_viewer_displaces_old() {
        let slot = ConnectionSlot::new("test");
        let (first_tx, mut first_rx) = channel(4);
        let (second_tx, mut second_rx) = channel(4);
        let first_closed = CancellationToken::new();
        let second_closed = CancellationToken::new();

        let first = slot.install(first_tx, first_closed.clone()).await;
        assert!(slot.deliver(GatewayMessage::text("one")).await);

        let second = slot.install(second_tx, second_closed.clone()).await;
        assert!(first_closed.is_cancelled());
        assert!(!second_closed.is_cancelled());

        assert!(slot.deliver(GatewayMessage::text("two")).await);

        assert_eq!(first_rx.recv().await.unwrap().text.as_deref(), Some("one"));
        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.recv().await.unwrap().text.as_deref(), Some("two"));

        // The displaced viewer leaving must not evict its replacement.
        slot.release(first).await;
        assert_eq!(slot.current_id().await, Some(second));
    }

    #[tokio::test]
    async fn test_deliver_without_viewer_drops() {
        let slot = ConnectionSlot::new("test");
        assert!(!slot.deliver(GatewayMessage::text("lost")).await);
    }

    #[tokio::test]
    async fn test_release_empties_slot() {
        let slot = ConnectionSlot::new("test");
        let (tx, _rx) = channel(1);
        let id = slot.install(tx, CancellationToken::new()).await;

        slot.release(id).await;
        assert_eq!(slot.current_id().await, None);
    }
}
