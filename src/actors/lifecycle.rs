//! Lifecycle Controller - reset both actors, wake the peer on a new session
//!
//! Hooks are plain async callbacks handed to gateways and actors at
//! construction time; nothing here is global.

use crate::actors::agent_actor::ActorControl;
use crate::actors::messages::{Role, StateSnapshot};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

pub type LifecycleHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
pub struct LifecycleController {
    responder: ActorControl,
    initiator: ActorControl,
}

impl LifecycleController {
    pub fn new(responder: ActorControl, initiator: ActorControl) -> Self {
        Self {
            responder,
            initiator,
        }
    }

    fn control(&self, role: Role) -> &ActorControl {
        match role {
            Role::Responder => &self.responder,
            Role::Initiator => &self.initiator,
        }
    }

    /// Pauses and clears both actors. Locks are taken one after the other,
    /// never nested.
    pub async fn reset_both(&self) {
        tracing::info!("Resetting both actors");
        self.initiator.reset().await;
        self.responder.reset().await;
    }

    pub async fn resume(&self, role: Role) -> bool {
        self.control(role).resume().await
    }

    pub async fn snapshot(&self) -> (StateSnapshot, StateSnapshot) {
        (
            self.responder.snapshot().await,
            self.initiator.snapshot().await,
        )
    }

    /// Hook for the gateways' reset command.
    pub fn reset_hook(&self) -> LifecycleHook {
        let controller = self.clone();
        Arc::new(move || {
            let controller = controller.clone();
            async move { controller.reset_both().await }.boxed()
        })
    }

    /// Hook that resumes `role`; the initiator uses it to wake its peer.
    pub fn resume_hook(&self, role: Role) -> LifecycleHook {
        let controller = self.clone();
        Arc::new(move || {
            let controller = controller.clone();
            async move {
                controller.resume(role).await;
            }
            .boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::agent_actor::AgentActor;
    use crate::actors::channels::Fabric;
    use crate::actors::persona::Persona;
    use crate::core::llm::{Generator, GeneratorFactory, LazyGenerator};

    fn controller() -> LifecycleController {
        let factory: GeneratorFactory = Arc::new(|| -> anyhow::Result<Arc<dyn Generator>> {
            Err(anyhow::anyhow!("unused"))
        });
        let generator = Arc::new(LazyGenerator::new(factory));
        let fabric = Fabric::new(1);
        let alice = AgentActor::new(
            Persona::alice(),
            "m",
            generator.clone(),
            fabric.responder.to_gateway.clone(),
            fabric.responder.to_peer.clone(),
        );
        let bob = AgentActor::new(
            Persona::bob(),
            "m",
            generator,
            fabric.initiator.to_gateway.clone(),
            fabric.initiator.to_peer.clone(),
        );
        LifecycleController::new(alice.control(), bob.control())
    }

    #[tokio::test]
    async fn test_reset_hook_pauses_both() {
        let lifecycle = controller();

        (lifecycle.reset_hook())().await;

        let (responder, initiator) = lifecycle.snapshot().await;
        assert!(responder.paused && initiator.paused);
        assert_eq!(responder.context_len + initiator.context_len, 0);
    }

    #[tokio::test]
    async fn test_resume_hook_wakes_only_its_role() {
        let lifecycle = controller();
        lifecycle.reset_both().await;

        (lifecycle.resume_hook(Role::Responder))().await;

        let (responder, initiator) = lifecycle.snapshot().await;
        assert!(!responder.paused);
        assert!(initiator.paused);
    }

    #[tokio::test]
    async fn test_concurrent_resets_do_not_deadlock() {
        let lifecycle = controller();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let lifecycle = lifecycle.clone();
            tasks.push(tokio::spawn(async move { lifecycle.reset_both().await }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let (responder, initiator) = lifecycle.snapshot().await;
        assert!(responder.paused && initiator.paused);
    }
}
