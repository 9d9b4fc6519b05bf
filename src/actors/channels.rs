//! Turn Channel Fabric - bounded links between actors and gateways
//!
//! Every producer-side send goes through `send_or_drop`: a full or closed
//! link loses the message instead of stalling the producer.

use crate::actors::messages::{GatewayMessage, Turn};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{channel, Receiver, Sender};

/// Non-blocking send. Returns whether the message was queued.
pub fn send_or_drop<T>(sender: &Sender<T>, message: T, link: &str) -> bool {
    match sender.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(link, "Channel full, dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::warn!(link, "Channel closed, dropping message");
            false
        }
    }
}

/// Channel ends owned by one agent actor.
pub struct ActorLinks {
    pub from_gateway: Receiver<String>,
    pub to_gateway: Sender<GatewayMessage>,
    pub from_peer: Receiver<Turn>,
    pub to_peer: Sender<Turn>,
}

/// Channel ends owned by one gateway.
pub struct GatewayLinks {
    pub to_actor: Sender<String>,
    pub from_actor: Receiver<GatewayMessage>,
}

pub struct Fabric {
    pub responder: ActorLinks,
    pub initiator: ActorLinks,
    pub responder_gateway: GatewayLinks,
    pub initiator_gateway: GatewayLinks,
}

impl Fabric {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        let (responder_in_tx, responder_in_rx) = channel(capacity);
        let (responder_out_tx, responder_out_rx) = channel(capacity);
        let (initiator_in_tx, initiator_in_rx) = channel(capacity);
        let (initiator_out_tx, initiator_out_rx) = channel(capacity);
        let (to_responder, from_initiator) = channel(capacity);
        let (to_initiator, from_responder) = channel(capacity);

        Self {
            responder: ActorLinks {
                from_gateway: responder_in_rx,
                to_gateway: responder_out_tx,
                from_peer: from_initiator,
                to_peer: to_initiator,
            },
            initiator: ActorLinks {
                from_gateway: initiator_in_rx,
                to_gateway: initiator_out_tx,
                from_peer: from_responder,
                to_peer: to_responder,
            },
            responder_gateway: GatewayLinks {
                to_actor: responder_in_tx,
                from_actor: responder_out_rx,
            },
            initiator_gateway: GatewayLinks {
                to_actor: initiator_in_tx,
                from_actor: initiator_out_rx,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_or_drop_drops_when_full() {
        let (tx, mut rx) = channel(1);

        assert!(send_or_drop(&tx, "first", "test"));
        assert!(!send_or_drop(&tx, "second", "test"));

        assert_eq!(rx.recv().await, Some("first"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_or_drop_on_closed_channel() {
        let (tx, rx) = channel::<u8>(1);
        drop(rx);
        assert!(!send_or_drop(&tx, 1, "test"));
    }

    #[tokio::test]
    async fn test_fabric_links_actors_crosswise() {
        let mut fabric = Fabric::new(0);

        fabric.initiator.to_peer.try_send(Turn::plain("to responder")).unwrap();
        fabric.responder.to_peer.try_send(Turn::plain("to initiator")).unwrap();
        fabric.initiator_gateway.to_actor.try_send("seed".to_string()).unwrap();

        assert_eq!(fabric.responder.from_peer.recv().await.unwrap().text(), "to responder");
        assert_eq!(fabric.initiator.from_peer.recv().await.unwrap().text(), "to initiator");
        assert_eq!(fabric.initiator.from_gateway.recv().await.unwrap(), "seed");
    }
}
