use regex::{Captures, Regex, RegexBuilder};
use serde_json::{Map, Value as JsonValue};
use toolshim_common::{CommandRuleConfig, DirectiveConfig, QuoteStyle, RuleHint, ToolPromptConfig};
use toolshim_protocol::{Message, MessageToolCall, Role};

use crate::error::TransformError;
use crate::registry::ToolRegistry;
use crate::utterance::{UtteranceFilter, UtteranceLocator};

#[derive(Debug, Clone)]
pub struct CommandRule {
    name: String,
    pattern: Regex,
    tool: Option<String>,
    arguments: Map<String, JsonValue>,
    lowercase_captures: bool,
    quote: QuoteStyle,
    skip_if_contains: Vec<String>,
}

impl CommandRule {
    pub fn compile(config: &CommandRuleConfig) -> Result<Self, TransformError> {
        let pattern = RegexBuilder::new(&config.pattern)
            .case_insensitive(!config.case_sensitive)
            .build()
            .map_err(|source| TransformError::InvalidPattern {
                name: config.name.clone(),
                source,
            })?;
        Ok(Self {
            name: config.name.clone(),
            pattern,
            tool: config.tool.clone(),
            arguments: config.arguments.clone(),
            lowercase_captures: config.lowercase_captures,
            quote: config.quote,
            skip_if_contains: config.skip_if_contains.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveOutcome {
    Fired {
        rule: String,
        calls: Vec<MessageToolCall>,
    },
    /// The newest turn is the effect of an earlier call.
    EchoGuard,
    NoUtterance,
    /// A rule matched, but the client declared none of the tools the
    /// matching rules call.
    ToolUnavailable,
    NoMatch,
}

/// Matches the latest genuine user utterance against the command rules and
/// produces tool calls without consulting a backend.
#[derive(Debug)]
pub struct DirectiveInterceptor {
    rules: Vec<CommandRule>,
    hints: Vec<RuleHint>,
    echo_markers: Vec<String>,
    execution_tool: String,
    execution_argument: String,
    locator: UtteranceLocator,
}

impl DirectiveInterceptor {
    pub fn new(config: &DirectiveConfig, tools: &ToolPromptConfig) -> Result<Self, TransformError> {
        let rules = config
            .rules
            .iter()
            .map(CommandRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let filter = UtteranceFilter::from_config(&config.utterance_filters)?;
        Ok(Self {
            rules,
            hints: config
                .rules
                .iter()
                .filter_map(|rule| rule.hint.clone())
                .collect(),
            echo_markers: config.echo_markers.clone(),
            execution_tool: tools.execution_tool.clone(),
            execution_argument: tools.execution_argument.clone(),
            locator: UtteranceLocator::new(&config.metadata_prefix, filter)?,
        })
    }

    pub fn hints(&self) -> &[RuleHint] {
        &self.hints
    }

    pub fn intercept(&self, messages: &[Message], registry: &ToolRegistry) -> DirectiveOutcome {
        if self.is_echo(messages) {
            return DirectiveOutcome::EchoGuard;
        }
        let Some(utterance) = self.locator.locate(messages) else {
            return DirectiveOutcome::NoUtterance;
        };
        let text = utterance.text.trim();
        let mut unavailable = false;
        for rule in &self.rules {
            if rule
                .skip_if_contains
                .iter()
                .any(|marker| text.contains(marker.as_str()))
            {
                continue;
            }
            let Some(caps) = rule.pattern.captures(text) else {
                continue;
            };
            let tool = rule.tool.as_deref().unwrap_or(&self.execution_tool);
            let Some(registered) = registry.get(tool) else {
                unavailable = true;
                continue;
            };

            let arguments = if rule.arguments.is_empty() {
                let key = if tool == self.execution_tool {
                    self.execution_argument.as_str()
                } else {
                    registered.argument.as_str()
                };
                let mut map = Map::new();
                map.insert(key.to_string(), JsonValue::String(text.to_string()));
                map
            } else {
                let ctx = TemplateContext {
                    caps: &caps,
                    chat_id: utterance.chat_id.as_deref(),
                    lowercase: rule.lowercase_captures,
                    quote: rule.quote,
                };
                rule.arguments
                    .iter()
                    .map(|(key, value)| (key.clone(), ctx.render_value(value)))
                    .collect()
            };

            let call = MessageToolCall::function(
                format!("call_{}_0", rule.name),
                tool,
                &JsonValue::Object(arguments),
            );
            return DirectiveOutcome::Fired {
                rule: rule.name.clone(),
                calls: vec![call],
            };
        }
        if unavailable {
            DirectiveOutcome::ToolUnavailable
        } else {
            DirectiveOutcome::NoMatch
        }
    }

    /// True when the newest conversation turn is a tool result, an assistant
    /// turn carrying tool calls, or text containing an echo marker.
    pub fn is_echo(&self, messages: &[Message]) -> bool {
        let Some(last) = messages.iter().rev().find(|m| !m.role.is_instruction()) else {
            return false;
        };
        match last.role {
            Role::Tool => true,
            Role::Assistant if last.has_tool_calls() => true,
            _ => {
                let text = last
                    .content
                    .as_ref()
                    .map(|content| content.joined_text())
                    .unwrap_or_default();
                self.echo_markers
                    .iter()
                    .any(|marker| !marker.is_empty() && text.contains(marker.as_str()))
            }
        }
    }
}

struct TemplateContext<'a, 'h> {
    caps: &'a Captures<'h>,
    chat_id: Option<&'a str>,
    lowercase: bool,
    quote: QuoteStyle,
}

impl TemplateContext<'_, '_> {
    fn render_value(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(template) => JsonValue::String(self.render(template)),
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|item| self.render_value(item)).collect())
            }
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), self.render_value(item)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Expands `{N}`, `{name}`, `{chat_id}` and `{?chat_id:..}` sections.
    /// Unknown placeholders are kept verbatim.
    fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            let Some(close) = matching_brace(tail) else {
                out.push_str(tail);
                return out;
            };
            let inner = &tail[1..close];
            match inner.strip_prefix('?').and_then(|s| s.split_once(':')) {
                Some((var, body)) => {
                    if self.lookup(var).is_some_and(|value| !value.is_empty()) {
                        out.push_str(&self.render(body));
                    }
                }
                None => match self.lookup(inner) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&tail[..=close]),
                },
            }
            rest = &tail[close + 1..];
        }
        out.push_str(rest);
        out
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if name == "chat_id" {
            return Some(self.chat_id.unwrap_or_default().to_string());
        }
        let capture = match name.parse::<usize>() {
            Ok(index) => self.caps.get(index),
            Err(_) => self.caps.name(name),
        };
        let Some(capture) = capture else {
            // A declared but unmatched group renders empty.
            return self.declares(name).then(String::new);
        };
        let mut value = capture.as_str().trim().to_string();
        if self.lowercase {
            value = value.to_lowercase();
        }
        if self.quote == QuoteStyle::Shell {
            value = value.replace('\'', r"'\''");
        }
        Some(value)
    }

    fn declares(&self, name: &str) -> bool {
        match name.parse::<usize>() {
            Ok(index) => index < self.caps.len(),
            Err(_) => false,
        }
    }
}

/// Byte offset of the `}` closing the `{` at offset 0.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests;
