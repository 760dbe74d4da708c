use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

/// Unknown members of a wire object, kept so a request or response survives
/// a decode/encode cycle without losing provider-specific fields.
pub type Passthrough = Map<String, JsonValue>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    /// Roles outside the current set, such as the legacy `function`, are
    /// carried through untouched.
    Other(String),
}

impl Role {
    /// System and developer turns carry instructions rather than conversation.
    pub fn is_instruction(&self) -> bool {
        matches!(self, Role::System | Role::Developer)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Other(other) => other.as_str(),
        }
    }

    pub fn from_wire(value: &str) -> Self {
        match value {
            "system" => Role::System,
            "developer" => Role::Developer,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            other => Role::Other(other.to_string()),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Role::from_wire(&value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Passthrough,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            extra: Passthrough::new(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        if self.kind == "text" {
            self.text.as_deref()
        } else {
            None
        }
    }
}

/// Message content is either a plain string or an ordered list of typed parts.
/// Only text parts are inspected; other parts pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The string content, or the first text part.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text.as_str()),
            MessageContent::Parts(parts) => parts.iter().find_map(ContentPart::as_text),
        }
    }

    /// All text parts joined by newlines.
    pub fn joined_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(ContentPart::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Appends to the string content or to the first text part. A part list
    /// without text gets a new text part.
    pub fn append_text(&mut self, suffix: &str) {
        match self {
            MessageContent::Text(text) => text.push_str(suffix),
            MessageContent::Parts(parts) => {
                let first_text = parts
                    .iter_mut()
                    .find(|part| part.kind == "text")
                    .and_then(|part| part.text.as_mut());
                match first_text {
                    Some(text) => text.push_str(suffix),
                    None => parts.push(ContentPart::text(suffix.trim_start())),
                }
            }
        }
    }

    /// Rewrites the string content or every text part.
    pub fn map_text(&mut self, mut f: impl FnMut(&str) -> String) {
        match self {
            MessageContent::Text(text) => *text = f(text),
            MessageContent::Parts(parts) => {
                for part in parts.iter_mut().filter(|part| part.kind == "text") {
                    if let Some(text) = part.text.as_mut() {
                        *text = f(text);
                    }
                }
            }
        }
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionObject {
    /// Clients occasionally send unnamed entries; those are not callable.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments; property order is preserved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonValue>,
    #[serde(flatten)]
    pub extra: Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionObject>,
    #[serde(flatten)]
    pub extra: Passthrough,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, parameters: Option<JsonValue>) -> Self {
        Self {
            kind: function_kind(),
            function: Some(FunctionObject {
                name: name.into(),
                description: None,
                parameters,
                extra: Passthrough::new(),
            }),
            extra: Passthrough::new(),
        }
    }

    /// Name of a `function` tool. Other tool kinds and empty names yield `None`.
    pub fn function_name(&self) -> Option<&str> {
        if self.kind != "function" {
            return None;
        }
        self.function
            .as_ref()
            .map(|function| function.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// First property declared in the parameter schema.
    pub fn first_parameter(&self) -> Option<&str> {
        self.function
            .as_ref()?
            .parameters
            .as_ref()?
            .get("properties")?
            .as_object()?
            .keys()
            .next()
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolCallType {
    #[serde(rename = "function")]
    Function,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ToolCallType,
    pub function: FunctionCall,
}

impl MessageToolCall {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: &JsonValue) -> Self {
        Self {
            id: id.into(),
            kind: ToolCallType::Function,
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    FunctionCall,
    /// Backends occasionally report reasons outside the standard set.
    Other(String),
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::FunctionCall => "function_call",
            FinishReason::Other(other) => other.as_str(),
        }
    }

    pub fn from_wire(value: &str) -> Self {
        match value {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            "function_call" => FinishReason::FunctionCall,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

impl Serialize for FinishReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FinishReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(FinishReason::from_wire(&value))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(flatten)]
    pub extra: Passthrough,
}
