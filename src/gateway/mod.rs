//! Viewer Gateway - websocket boundary for one agent
//!
//! Information Hiding:
//! - Single connection slot, last connection wins
//! - Wire format (JSON `GatewayMessage`) decoded here, actors only see text
//! - Reset command routed to a lifecycle hook supplied by the caller

mod slot;

pub use slot::ConnectionSlot;

use crate::actors::channels::{send_or_drop, GatewayLinks};
use crate::actors::lifecycle::LifecycleHook;
use crate::actors::messages::GatewayMessage;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio_util::sync::CancellationToken;

struct GatewayShared {
    name: String,
    to_actor: Sender<String>,
    slot: ConnectionSlot,
    on_reset: Option<LifecycleHook>,
    connection_buffer: usize,
}

#[derive(Clone)]
struct GatewayState {
    shared: Arc<GatewayShared>,
    cancel: CancellationToken,
}

pub struct Gateway {
    name: String,
    links: GatewayLinks,
    on_reset: Option<LifecycleHook>,
    connection_buffer: usize,
}

impl Gateway {
    pub fn new(name: impl Into<String>, links: GatewayLinks, connection_buffer: usize) -> Self {
        Self {
            name: name.into(),
            links,
            on_reset: None,
            connection_buffer: connection_buffer.max(1),
        }
    }

    /// Hook run when a viewer sends `{"type":"reset"}`.
    pub fn with_reset_hook(mut self, hook: LifecycleHook) -> Self {
        self.on_reset = Some(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepts viewers on `listener` and forwards actor output until `cancel` fires.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> anyhow::Result<()> {
        let Gateway {
            name,
            links,
            on_reset,
            connection_buffer,
        } = self;
        let shared = Arc::new(GatewayShared {
            slot: ConnectionSlot::new(name.clone()),
            name,
            to_actor: links.to_actor,
            on_reset,
            connection_buffer,
        });
        let from_actor = links.from_actor;

        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!(gateway = %shared.name, %addr, "Gateway listening");

        let app = Router::new().route("/", get(upgrade)).with_state(GatewayState {
            shared: shared.clone(),
            cancel: cancel.clone(),
        });

        let server_cancel = cancel.clone();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .into_future();

        let (served, ()) = tokio::join!(server, forward_outbound(shared.clone(), from_actor, cancel));

        shared.slot.clear().await;
        tracing::info!(gateway = %shared.name, "Gateway stopped");
        served.map_err(|e| anyhow::anyhow!("Gateway {} failed: {}", shared.name, e))
    }
}

async fn forward_outbound(
    shared: Arc<GatewayShared>,
    mut from_actor: Receiver<GatewayMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = from_actor.recv() => match message {
                Some(message) => {
                    shared.slot.deliver(message).await;
                }
                None => break,
            },
        }
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let GatewayState { shared, cancel } = state;
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = channel::<GatewayMessage>(shared.connection_buffer);
    let closed = cancel.child_token();
    let id = shared.slot.install(tx.clone(), closed.clone()).await;

    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(gateway = %shared.name, error = %e, "Failed to encode message");
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    tracing::warn!(gateway = %shared.name, error = %e, "Failed to send to viewer");
                    break;
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => handle_inbound(&shared, &text, &tx).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(gateway = %shared.name, error = %e, "Viewer receive error");
                    break;
                }
            },
        }
    }

    shared.slot.release(id).await;
}

async fn handle_inbound(shared: &GatewayShared, raw: &str, reply: &Sender<GatewayMessage>) {
    let message: GatewayMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(gateway = %shared.name, error = %e, "Ignoring undecodable viewer message");
            return;
        }
    };

    if message.is_reset() {
        tracing::info!(gateway = %shared.name, "Reset requested by viewer");
        if let Some(hook) = &shared.on_reset {
            hook().await;
        }
        send_or_drop(reply, GatewayMessage::reset_ack(), &format!("{}->viewer", shared.name));
        return;
    }

    match message.text {
        Some(text) if !text.is_empty() => {
            tracing::info!(gateway = %shared.name, %text, "Viewer sent text");
            send_or_drop(&shared.to_actor, text, &format!("{}->actor", shared.name));
        }
        _ => tracing::debug!(gateway = %shared.name, "Ignoring viewer message without text"),
    }
}
