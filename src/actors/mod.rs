pub mod agent_actor;
pub mod channels;
pub mod lifecycle;
pub mod messages;
pub mod orchestrator;
pub mod persona;

pub use agent_actor::{ActorControl, AgentActor};
pub use lifecycle::{LifecycleController, LifecycleHook};
pub use orchestrator::{Orchestrator, RunningConversation};
