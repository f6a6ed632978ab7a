// Messages exchanged with the chat-completion API and the events the
// streaming client reports back to the app loop.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming events
// ---------------------------------------------------------------------------

/// Event produced while a completion streams in.
///
/// Every variant carries the generation of the request that produced it so
/// the receiver can drop events from superseded requests.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    Token {
        text: String,
        generation: u64,
    },
    Complete {
        full_text: String,
        input_tokens: u32,
        output_tokens: u32,
        generation: u64,
    },
    Error {
        message: String,
        generation: u64,
    },
}

impl LlmEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LlmEvent::Token { generation, .. }
            | LlmEvent::Complete { generation, .. }
            | LlmEvent::Error { generation, .. } => *generation,
        }
    }
}

/// Progress of the current assistant request, as shown in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmStatus {
    #[default]
    Idle,
    Streaming,
    Complete,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::assistant("hola");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["content"], "hola");
        assert_eq!(
            serde_json::to_value(ChatRole::System).unwrap(),
            serde_json::json!("system")
        );
    }

    #[test]
    fn event_generation() {
        let e = LlmEvent::Error {
            message: "x".into(),
            generation: 9,
        };
        assert_eq!(e.generation(), 9);
    }
}
