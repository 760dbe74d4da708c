use serde::{Deserialize, Serialize};

use crate::chat::types::{FinishReason, MessageToolCall, Passthrough, Role, Usage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatCompletionObjectType {
    #[serde(rename = "chat.completion")]
    ChatCompletion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default = "assistant_role")]
    pub role: Role,
    /// Serialized as `null` when absent, matching the upstream dialect.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<MessageToolCall>>,
    #[serde(flatten)]
    pub extra: Passthrough,
}

fn assistant_role() -> Role {
    Role::Assistant
}

impl ResponseMessage {
    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<MessageToolCall>>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            extra: Passthrough::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    #[serde(default)]
    pub index: i64,
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    #[serde(flatten)]
    pub extra: Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default = "completion_object")]
    pub object: ChatCompletionObjectType,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub extra: Passthrough,
}

fn completion_object() -> ChatCompletionObjectType {
    ChatCompletionObjectType::ChatCompletion
}

impl ChatCompletion {
    /// The first choice; the pipeline never requests `n > 1`.
    pub fn primary(&self) -> Option<&ChatCompletionChoice> {
        self.choices.first()
    }
}
