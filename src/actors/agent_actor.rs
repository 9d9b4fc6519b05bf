//! Agent Actor - one side of the dialogue
//!
//! Information Hiding:
//! - Pause flag and context guarded together behind `ActorControl`
//! - Generation client bound lazily, shared read-only afterwards
//! - Repair policy applied before anything leaves the actor

use crate::actors::channels::send_or_drop;
use crate::actors::lifecycle::LifecycleHook;
use crate::actors::messages::*;
use crate::actors::persona::Persona;
use crate::core::llm::{ChatMessage, GeneratorUnavailable, LazyGenerator};
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ActorError {
    #[error(transparent)]
    ClientUnavailable(#[from] GeneratorUnavailable),
    #[error("generation failed: {0}")]
    Generation(anyhow::Error),
}

/// Pause flag and conversation context. Always mutated together.
///
/// `session` advances on every reset, so work started before a reset can be
/// told apart from the session that followed it.
#[derive(Debug, Default)]
pub struct ActorState {
    paused: bool,
    session: u64,
    context: Vec<ContextEntry>,
}

impl ActorState {
    fn history(&self) -> Vec<ChatMessage> {
        self.context
            .iter()
            .map(|entry| match entry.origin {
                Origin::Own => ChatMessage::assistant(entry.text.clone()),
                Origin::Peer => ChatMessage::user(entry.text.clone()),
            })
            .collect()
    }
}

/// Shared handle onto an actor's lifecycle state.
#[derive(Clone)]
pub struct ActorControl {
    role: Role,
    state: Arc<Mutex<ActorState>>,
}

impl ActorControl {
    fn new(role: Role) -> Self {
        Self {
            role,
            state: Arc::new(Mutex::new(ActorState::default())),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Pause and clear context in one step. Idempotent.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let dropped = state.context.len();
        state.paused = true;
        state.session = state.session.wrapping_add(1);
        state.context.clear();
        tracing::info!(role = %self.role, dropped, "Actor reset");
    }

    /// Leave the paused state. Idempotent when already active.
    pub async fn resume(&self) -> bool {
        let mut state = self.state.lock().await;
        let was_paused = std::mem::replace(&mut state.paused, false);
        if was_paused {
            tracing::info!(role = %self.role, "Actor resumed");
        }
        was_paused
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        let state = self.state.lock().await;
        StateSnapshot {
            role: self.role,
            paused: state.paused,
            context_len: state.context.len(),
        }
    }

    pub async fn context(&self) -> Vec<ContextEntry> {
        self.state.lock().await.context.clone()
    }
}

pub struct AgentActor {
    persona: Arc<Persona>,
    model: String,
    control: ActorControl,
    generator: Arc<LazyGenerator>,
    to_gateway: Sender<GatewayMessage>,
    to_peer: Sender<Turn>,
    on_new_session: Option<LifecycleHook>,
}

impl AgentActor {
    pub fn new(
        persona: Persona,
        model: impl Into<String>,
        generator: Arc<LazyGenerator>,
        to_gateway: Sender<GatewayMessage>,
        to_peer: Sender<Turn>,
    ) -> Self {
        let control = ActorControl::new(persona.role);
        Self {
            persona: Arc::new(persona),
            model: model.into(),
            control,
            generator,
            to_gateway,
            to_peer,
            on_new_session: None,
        }
    }

    /// Hook fired when viewer input arrives while this actor is paused.
    pub fn with_new_session_hook(mut self, hook: LifecycleHook) -> Self {
        self.on_new_session = Some(hook);
        self
    }

    pub fn control(&self) -> ActorControl {
        self.control.clone()
    }

    pub async fn run(
        self,
        mut from_gateway: Receiver<String>,
        mut from_peer: Receiver<Turn>,
        cancel: CancellationToken,
    ) {
        let role = self.persona.role;
        tracing::info!(%role, name = %self.persona.name, "Agent actor started");

        let mut gateway_open = true;
        let mut peer_open = true;

        while gateway_open || peer_open {
            tokio::select! {
                _ = cancel.cancelled() => break,

                input = from_gateway.recv(), if gateway_open => match input {
                    Some(text) => self.handle_viewer_input(text).await,
                    None => gateway_open = false,
                },

                turn = from_peer.recv(), if peer_open => match turn {
                    Some(turn) => {
                        if self.handle_peer_turn(turn, &cancel).await.is_break() {
                            break;
                        }
                    }
                    None => peer_open = false,
                },
            }
        }

        tracing::info!(%role, "Agent actor stopped");
    }

    async fn handle_viewer_input(&self, input: String) {
        let role = self.persona.role;

        if !role.accepts_viewer_input() {
            tracing::info!(%role, text = %input, "Ignoring viewer input");
            return;
        }

        tracing::info!(%role, text = %input, "Viewer input received");

        send_or_drop(
            &self.to_gateway,
            GatewayMessage::text(input.clone()),
            &format!("{}->gateway", role),
        );

        let seed = self.persona.format.wrap(&input);

        let was_paused = {
            let mut state = self.control.state.lock().await;
            let was_paused = std::mem::replace(&mut state.paused, false);
            state.context.push(ContextEntry::own(seed.clone()));
            was_paused
        };

        if was_paused {
            tracing::info!(%role, "New session started, waking peer");
            if let Some(hook) = &self.on_new_session {
                hook().await;
            }
        }

        send_or_drop(
            &self.to_peer,
            Turn::tagged(seed, self.persona.tag()),
            &format!("{}->{}", role, role.peer()),
        );
    }

    /// Processes one peer turn. Breaks when cancellation arrives mid-turn.
    async fn handle_peer_turn(&self, turn: Turn, cancel: &CancellationToken) -> ControlFlow<()> {
        let role = self.persona.role;

        let (session, history) = {
            let mut state = self.control.state.lock().await;
            if state.paused {
                tracing::debug!(%role, "Paused, discarding peer turn");
                return ControlFlow::Continue(());
            }
            state.context.push(ContextEntry::peer(turn.into_text()));
            (state.session, state.history())
        };

        let reply = tokio::select! {
            _ = cancel.cancelled() => return ControlFlow::Break(()),
            reply = self.generate(&history) => reply,
        };

        let reply = match reply {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(%role, error = %e, "Dropping turn");
                return ControlFlow::Continue(());
            }
        };

        let repaired = self.persona.format.repair(&reply, &self.persona.fallback);

        {
            let mut state = self.control.state.lock().await;
            if state.paused || state.session != session {
                tracing::info!(%role, "Reset during generation, discarding reply");
                return ControlFlow::Continue(());
            }
            state.context.push(ContextEntry::own(repaired.text.clone()));
        }

        tracing::info!(%role, outcome = ?repaired.outcome, text = %repaired.text, "Reply ready");

        send_or_drop(
            &self.to_gateway,
            GatewayMessage::text(self.persona.format.strip(&repaired.text)),
            &format!("{}->gateway", role),
        );
        send_or_drop(
            &self.to_peer,
            Turn::tagged(repaired.text, self.persona.tag()),
            &format!("{}->{}", role, role.peer()),
        );

        ControlFlow::Continue(())
    }

    async fn generate(&self, history: &[ChatMessage]) -> Result<String, ActorError> {
        let generator = self.generator.get()?;
        generator
            .generate(&self.persona.system_prompt, history, &self.model)
            .await
            .map_err(ActorError::Generation)
    }
}
