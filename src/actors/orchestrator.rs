//! Conversation Orchestrator - wires channels, actors and gateways
//!
//! Information Hiding:
//! - Channel topology built in one place
//! - Lifecycle hooks installed here, actors and gateways never see each other
//! - Every task shares one cancellation token and is awaited on shutdown

use crate::actors::agent_actor::AgentActor;
use crate::actors::channels::{ActorLinks, Fabric};
use crate::actors::lifecycle::LifecycleController;
use crate::actors::messages::{GatewayMessage, Role};
use crate::actors::persona::Persona;
use crate::audio::gemini::GeminiSpeech;
use crate::audio::{narration_tap, RetryingSynthesizer, SpeechSynthesizer};
use crate::config::Settings;
use crate::core::llm::{GeneratorFactory, LLMClient, LazyGenerator};
use crate::gateway::Gateway;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{channel, Receiver};
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

pub struct Orchestrator {
    settings: Settings,
    factory: GeneratorFactory,
    narrators: Option<(Arc<dyn SpeechSynthesizer>, Arc<dyn SpeechSynthesizer>)>,
}

/// Handle on a started conversation.
pub struct RunningConversation {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    lifecycle: LifecycleController,
    responder_addr: SocketAddr,
    initiator_addr: SocketAddr,
    grace: Duration,
}

impl Orchestrator {
    pub fn new(settings: Settings) -> Self {
        let factory = LLMClient::factory(settings.clone());
        Self {
            settings,
            factory,
            narrators: None,
        }
    }

    pub fn with_generator_factory(mut self, factory: GeneratorFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Narrate each side's output with the given synthesizers (responder, initiator).
    pub fn with_narrators(
        mut self,
        responder: Arc<dyn SpeechSynthesizer>,
        initiator: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        self.narrators = Some((responder, initiator));
        self
    }

    /// Builds the Gemini narrators when audio is enabled and a key is present.
    fn configured_narrators(&self) -> Option<(Arc<dyn SpeechSynthesizer>, Arc<dyn SpeechSynthesizer>)> {
        let audio = &self.settings.audio;
        if !audio.enabled {
            return None;
        }

        let api_key = match Settings::speech_api_key() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Audio disabled: {}", e);
                return None;
            }
        };

        let voice = |voice: &str, prefix: &str| -> Arc<dyn SpeechSynthesizer> {
            Arc::new(RetryingSynthesizer::new(
                GeminiSpeech::new(api_key.clone(), audio, voice, prefix),
                audio.max_attempts,
            ))
        };

        Some((
            voice(&audio.responder_voice, "alice"),
            voice(&audio.initiator_voice, "bob"),
        ))
    }

    /// Binds both gateways and spawns every loop.
    pub async fn start(self) -> Result<RunningConversation> {
        let settings = &self.settings;
        let capacity = settings.channel_capacity();
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let responder_listener =
            TcpListener::bind((settings.gateway.host.as_str(), settings.gateway.responder_port)).await?;
        let initiator_listener =
            TcpListener::bind((settings.gateway.host.as_str(), settings.gateway.initiator_port)).await?;
        let responder_addr = responder_listener.local_addr()?;
        let initiator_addr = initiator_listener.local_addr()?;

        let Fabric {
            responder,
            initiator,
            mut responder_gateway,
            mut initiator_gateway,
        } = Fabric::new(capacity);
        let ActorLinks {
            from_gateway: responder_inbound,
            to_gateway: responder_outbound,
            from_peer: from_initiator,
            to_peer: to_initiator,
        } = responder;
        let ActorLinks {
            from_gateway: initiator_inbound,
            to_gateway: initiator_outbound,
            from_peer: from_responder,
            to_peer: to_responder,
        } = initiator;

        let generator = Arc::new(LazyGenerator::new(self.factory.clone()));
        let model = settings.llm.model.clone();

        let alice = AgentActor::new(
            Persona::for_role(Role::Responder),
            model.clone(),
            generator.clone(),
            responder_outbound,
            to_initiator,
        );
        let bob = AgentActor::new(
            Persona::for_role(Role::Initiator),
            model,
            generator,
            initiator_outbound,
            to_responder,
        );

        let lifecycle = LifecycleController::new(alice.control(), bob.control());
        let bob = bob.with_new_session_hook(lifecycle.resume_hook(Role::Responder));

        let narrators = self.narrators.clone().or_else(|| self.configured_narrators());
        if let Some((responder_voice, initiator_voice)) = narrators {
            responder_gateway.from_actor = spawn_tap(
                &mut tasks,
                "alice",
                responder_gateway.from_actor,
                responder_voice,
                capacity,
                &cancel,
            );
            initiator_gateway.from_actor = spawn_tap(
                &mut tasks,
                "bob",
                initiator_gateway.from_actor,
                initiator_voice,
                capacity,
                &cancel,
            );
        }

        let alice_gateway = Gateway::new("alice", responder_gateway, capacity)
            .with_reset_hook(lifecycle.reset_hook());
        let bob_gateway = Gateway::new("bob", initiator_gateway, capacity)
            .with_reset_hook(lifecycle.reset_hook());

        tasks.spawn(alice.run(responder_inbound, from_initiator, cancel.clone()));
        tasks.spawn(bob.run(initiator_inbound, from_responder, cancel.clone()));

        for (gateway, listener) in [
            (alice_gateway, responder_listener),
            (bob_gateway, initiator_listener),
        ] {
            let gateway_cancel = cancel.clone();
            tasks.spawn(async move {
                let name = gateway.name().to_string();
                if let Err(e) = gateway.serve(listener, gateway_cancel).await {
                    tracing::error!(gateway = %name, error = %e, "Gateway error");
                }
            });
        }

        tracing::info!(%responder_addr, %initiator_addr, "Conversation running");

        Ok(RunningConversation {
            cancel,
            tasks,
            lifecycle,
            responder_addr,
            initiator_addr,
            grace: Duration::from_millis(settings.system.shutdown_grace_ms),
        })
    }

}

fn spawn_tap(
    tasks: &mut JoinSet<()>,
    name: &str,
    from_actor: Receiver<GatewayMessage>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    capacity: usize,
    cancel: &CancellationToken,
) -> Receiver<GatewayMessage> {
    let (tx, rx) = channel(capacity);
    tasks.spawn(narration_tap(
        name.to_string(),
        from_actor,
        tx,
        synthesizer,
        cancel.clone(),
    ));
    rx
}

impl RunningConversation {
    pub fn responder_addr(&self) -> SocketAddr {
        self.responder_addr
    }

    pub fn initiator_addr(&self) -> SocketAddr {
        self.initiator_addr
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    /// Waits for Ctrl+C / SIGTERM, then shuts down.
    pub async fn shutdown_on_signal(self) -> Result<()> {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        self.shutdown().await
    }

    /// Cancels every loop and waits (bounded) for all of them to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();

        let tasks = &mut self.tasks;
        let drained = timeout(self.grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!("Task ended abnormally: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = self.tasks.len(),
                "Tasks still running after grace period, aborting"
            );
            self.tasks.shutdown().await;
        }

        tracing::info!("Conversation stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
