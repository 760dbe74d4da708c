use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// How capture substitutions are escaped inside string argument templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    #[default]
    None,
    /// Escapes `'` as `'\''` for use inside single-quoted shell words.
    Shell,
}

/// A line listed in the injected tool instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHint {
    /// What the user says, e.g. `stats`.
    pub when: String,
    /// The exact call line the backend should produce.
    pub call: String,
}

/// A directive: a pattern over the latest genuine user utterance and the tool
/// call it produces without consulting a backend.
///
/// String values inside `arguments` are templates. `{0}`, `{1}`, .. expand to
/// positional captures, `{name}` to named captures and `{chat_id}` to the chat
/// id found in the conversation envelope (empty when absent). A `{?chat_id:..}`
/// section renders its body only when a chat id is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRuleConfig {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Target tool. Defaults to the execution tool.
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub arguments: Map<String, JsonValue>,
    #[serde(default)]
    pub lowercase_captures: bool,
    #[serde(default)]
    pub quote: QuoteStyle,
    /// The rule is not tried when the utterance contains any of these.
    #[serde(default)]
    pub skip_if_contains: Vec<String>,
    #[serde(default)]
    pub hint: Option<RuleHint>,
}

/// One member of the "not a real user utterance" predicate set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UtteranceFilterConfig {
    Prefix {
        value: String,
    },
    Contains {
        value: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    /// Matches when `value` occurs within the first `within` characters.
    ContainsWithin {
        value: String,
        within: usize,
    },
    Regex {
        pattern: String,
    },
}

pub fn default_utterance_filters() -> Vec<UtteranceFilterConfig> {
    vec![
        UtteranceFilterConfig::Prefix {
            value: "System:".to_string(),
        },
        UtteranceFilterConfig::Contains {
            value: "cron job".to_string(),
            case_insensitive: true,
        },
        UtteranceFilterConfig::ContainsWithin {
            value: "Cron:".to_string(),
            within: 200,
        },
        UtteranceFilterConfig::Prefix {
            value: "NO_REPLY".to_string(),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectiveConfig {
    pub rules: Vec<CommandRuleConfig>,
    /// Text that marks a turn as the echo of an executed tool call.
    pub echo_markers: Vec<String>,
    pub utterance_filters: Vec<UtteranceFilterConfig>,
    /// Leading text of a conversation metadata envelope.
    pub metadata_prefix: String,
}

impl Default for DirectiveConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            echo_markers: vec!["Exec completed".to_string()],
            utterance_filters: default_utterance_filters(),
            metadata_prefix: "Conversation info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPromptConfig {
    /// Line prefix the backend is told to use for calls.
    pub marker: String,
    /// Generic command-execution tool name.
    pub execution_tool: String,
    /// Argument key used for directive calls when the tool declares no parameters.
    pub execution_argument: String,
    /// Argument key used for extracted calls when the tool declares no parameters.
    pub fallback_argument: String,
}

impl Default for ToolPromptConfig {
    fn default() -> Self {
        Self {
            marker: "TOOL_CALL:".to_string(),
            execution_tool: "exec".to_string(),
            execution_argument: "command".to_string(),
            fallback_argument: "input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub token: String,
    /// Replaces a backend answer that is just the token.
    pub fallback: String,
    /// Appended to every system/developer turn on the local route.
    pub system_override: String,
    pub thinking_placeholder: String,
    pub empty_placeholder: String,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            token: "NO_REPLY".to_string(),
            fallback: "Hey! I got your message. What's on your mind?".to_string(),
            system_override: "\n\nIMPORTANT OVERRIDE: You must ALWAYS respond with helpful, \
                conversational text. Never respond with just 'NO_REPLY' or any variant. Always \
                engage with the user's message and provide a thoughtful response. If you're \
                unsure what to say, ask a follow-up question."
                .to_string(),
            thinking_placeholder: "(thinking...)".to_string(),
            empty_placeholder: "(no response)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// SearXNG-style JSON endpoint. Search is disabled when unset.
    pub endpoint: Option<String>,
    pub max_results: usize,
    pub min_chars: usize,
    pub max_chars: usize,
    /// A `?`-terminated question needs more words than this to trigger.
    pub min_question_words: usize,
    pub max_query_chars: usize,
    pub triggers: String,
    pub skip: String,
    pub skip_markers: Vec<String>,
    pub filler_prefixes: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_results: 5,
            min_chars: 5,
            max_chars: 300,
            min_question_words: 4,
            max_query_chars: 200,
            triggers: r"(?i)\b(?:latest|current|today|yesterday|recent|news|price|weather|score|stock|update|who is|what is|when is|when did|where is|how much|how many|search|look up|find out|google|what happened|tell me about|do you know|can you find|2024|2025|2026)\b".to_string(),
            skip: r"(?i)^(?:hi|hello|hey|yo|sup|thanks|thank you|ok|okay|bye|good morning|good night|how are you|what's up|whats up|gm|gn|lol|haha|yes|no|yep|nah)\s*[?!.]*$".to_string(),
            skip_markers: [
                "Conversation info",
                "conversation_label",
                "HEARTBEAT",
                "cron",
                "Cron:",
                "[cron:",
                "sessionId",
                "sessionKey",
                "transcript /",
                "Queued messages",
                "Queued #",
                "Queued announce",
                "was_mentioned",
                "Current time:",
                "untrusted metadata",
                "signal-poll",
                "health-check",
                "SKILL.md",
                "scripts/",
                "exec cd",
                "exec node",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            filler_prefixes: [
                "can you",
                "could you",
                "please",
                "tell me",
                "do you know",
                "search for",
                "look up",
                "find out",
                "google",
                "what is",
                "who is",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            timeout_secs: 15,
        }
    }
}
