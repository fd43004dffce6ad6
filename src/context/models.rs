//! Data models for conversation context

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Capitalized label used in transcripts
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed content part. Only text parts are counted and rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Message content: plain text or a sequence of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Iterate over the text fragments of this content
    pub fn text_parts(&self) -> Vec<&str> {
        match self {
            MessageContent::Text(text) => vec![text.as_str()],
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect(),
        }
    }
}

/// A role-tagged chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }

    /// Rendered text of the message; text parts are joined by newlines
    pub fn text(&self) -> Cow<'_, str> {
        match &self.content {
            MessageContent::Text(text) => Cow::Borrowed(text.as_str()),
            MessageContent::Parts(_) => Cow::Owned(self.content.text_parts().join("\n")),
        }
    }
}

/// Everything needed to assemble one conversational exchange
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub system_prompt: String,
    /// Tool definitions; counted against the budget but never emitted as a message
    #[serde(default)]
    pub tool_definitions: Option<serde_json::Value>,
    #[serde(default)]
    pub rag_context: Option<String>,
    /// Oldest first, excluding the new message
    #[serde(default)]
    pub history: Vec<Message>,
    pub new_message: String,
}

impl ConversationContext {
    pub fn new(system_prompt: impl Into<String>, new_message: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            new_message: new_message.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_rag_context(mut self, rag_context: impl Into<String>) -> Self {
        self.rag_context = Some(rag_context.into());
        self
    }

    pub fn with_tool_definitions(mut self, tools: serde_json::Value) -> Self {
        self.tool_definitions = Some(tools);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_render_text_only() {
        let msg = Message::with_parts(
            Role::User,
            vec![
                ContentPart::Text { text: "first".to_string() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: "https://example.com/chart.png".to_string() },
                },
                ContentPart::Text { text: "second".to_string() },
            ],
        );
        assert_eq!(msg.text(), "first\nsecond");
    }

    #[test]
    fn test_message_wire_format() {
        let msg = Message::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));

        let parsed: Message = serde_json::from_value(serde_json::json!({
            "role": "user",
            "content": [{"type": "text", "text": "hello"}]
        }))
        .unwrap();
        assert_eq!(parsed.text(), "hello");
    }
}
