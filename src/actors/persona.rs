use crate::actors::messages::Role;
use crate::core::fragment::TagFormat;

/// Fixed character one actor plays: its prompt, tag convention and fallback line.
#[derive(Debug, Clone)]
pub struct Persona {
    pub role: Role,
    pub name: String,
    pub format: TagFormat,
    pub system_prompt: String,
    pub fallback: String,
}

impl Persona {
    pub fn new(
        role: Role,
        name: impl Into<String>,
        tag: impl Into<String>,
        system_prompt: impl Into<String>,
        fallback_line: &str,
    ) -> Self {
        let format = TagFormat::new(tag);
        let fallback = format.wrap(fallback_line);
        Self {
            role,
            name: name.into(),
            format,
            system_prompt: system_prompt.into(),
            fallback,
        }
    }

    pub fn tag(&self) -> &str {
        self.format.tag()
    }

    /// Alice answers questions.
    pub fn alice() -> Self {
        Self::new(
            Role::Responder,
            "Alice",
            "alice",
            "You are Alice, a knowledgeable and friendly expert taking part in a spoken \
             conversation with Bob. Bob asks questions; answer each one clearly in two to \
             four sentences, the way you would speak aloud. Stay on the topic Bob raised.\n\n\
             IMPORTANT: Wrap your entire reply in <alice></alice> tags, for example:\n\
             <alice>Rivers carry water from high ground to the sea.</alice>\n\
             Do not add anything outside the tags.",
            "Sorry, I lost my train of thought. Could you ask that again?",
        )
    }

    /// Bob asks them.
    pub fn bob() -> Self {
        Self::new(
            Role::Initiator,
            "Bob",
            "bob",
            "You are Bob, a curious interviewer talking with Alice. The first message you \
             see is the topic your audience picked. Ask Alice one short question at a time \
             about it, and after each answer ask a natural follow-up that digs deeper.\n\n\
             IMPORTANT: Wrap your entire reply in <bob></bob> tags, for example:\n\
             <bob>What makes a river change course?</bob>\n\
             Do not add anything outside the tags.",
            "Sorry, I didn't catch that. Could you say it another way?",
        )
    }

    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Responder => Self::alice(),
            Role::Initiator => Self::bob(),
        }
    }
}
