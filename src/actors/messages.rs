use serde::{Deserialize, Serialize};
use std::fmt;

/// The two seats at the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Role "A": answers whatever the initiator brings up.
    Responder,
    /// Role "B": seeded by its viewer, starts each exchange.
    Initiator,
}

impl Role {
    pub fn peer(self) -> Role {
        match self {
            Role::Responder => Role::Initiator,
            Role::Initiator => Role::Responder,
        }
    }

    /// Only the initiator turns viewer input into conversation seeds.
    pub fn accepts_viewer_input(self) -> bool {
        matches!(self, Role::Initiator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Responder => write!(f, "responder"),
            Role::Initiator => write!(f, "initiator"),
        }
    }
}

/// One unit of dialogue passed between actors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    text: String,
    tag: Option<String>,
}

impl Turn {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: None,
        }
    }

    pub fn tagged(text: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: Some(tag.into()),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Who authored a context entry, from the owning actor's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Own,
    Peer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub origin: Origin,
    pub text: String,
}

impl ContextEntry {
    pub fn own(text: impl Into<String>) -> Self {
        Self {
            origin: Origin::Own,
            text: text.into(),
        }
    }

    pub fn peer(text: impl Into<String>) -> Self {
        Self {
            origin: Origin::Peer,
            text: text.into(),
        }
    }
}

/// Control record types carried in the `type` field of gateway messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Reset,
    ResetAck,
    #[serde(other)]
    Unknown,
}

/// JSON record exchanged with a viewer, in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl GatewayMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn reset_ack() -> Self {
        Self {
            kind: Some(MessageKind::ResetAck),
            ..Self::default()
        }
    }

    pub fn with_audio(mut self, audio: impl Into<String>) -> Self {
        self.audio = Some(audio.into());
        self
    }

    pub fn is_reset(&self) -> bool {
        self.kind == Some(MessageKind::Reset)
    }
}

/// Point-in-time view of one actor's lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub role: Role,
    pub paused: bool,
    pub context_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_message_wire_format() {
        let json = serde_json::to_string(&GatewayMessage::text("hi")).unwrap();
        assert_eq!(json, r#"{"text":"hi"}"#);

        let json = serde_json::to_string(&GatewayMessage::reset_ack()).unwrap();
        assert_eq!(json, r#"{"type":"reset_ack"}"#);

        let parsed: GatewayMessage = serde_json::from_str(r#"{"type":"reset"}"#).unwrap();
        assert!(parsed.is_reset());

        let parsed: GatewayMessage = serde_json::from_str(r#"{"type":"ping","text":"x"}"#).unwrap();
        assert_eq!(parsed.kind, Some(MessageKind::Unknown));
        assert_eq!(parsed.text.as_deref(), Some("x"));
    }

    #[test]
    fn test_roles() {
        assert_eq!(Role::Responder.peer(), Role::Initiator);
        assert!(Role::Initiator.accepts_viewer_input());
        assert!(!Role::Responder.accepts_viewer_input());
    }
}
