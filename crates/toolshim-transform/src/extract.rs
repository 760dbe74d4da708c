use std::ops::Range;

use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use toolshim_common::ToolPromptConfig;
use toolshim_protocol::MessageToolCall;

use crate::error::{TransformError, compile};
use crate::registry::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStrategy {
    /// `TOOL_CALL: <tool> <argument>` lines.
    Marker,
    /// An execution command inside a fenced code block.
    Fenced,
    /// A bare execution command at the start of a line.
    Bare,
}

impl ExtractStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractStrategy::Marker => "marker",
            ExtractStrategy::Fenced => "fenced",
            ExtractStrategy::Bare => "bare",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub content: String,
    pub calls: Vec<MessageToolCall>,
    pub strategy: Option<ExtractStrategy>,
    /// Marker lines naming tools the client did not declare.
    pub discarded: Vec<String>,
}

impl Extraction {
    fn unchanged(text: &str, discarded: Vec<String>) -> Self {
        Self {
            content: text.to_string(),
            calls: Vec::new(),
            strategy: None,
            discarded,
        }
    }
}

/// Recovers structured tool calls from free text.
#[derive(Debug, Clone)]
pub struct ToolCallExtractor {
    marker: Regex,
    fenced: Regex,
    bare: Regex,
    blank_runs: Regex,
    execution_tool: String,
}

impl ToolCallExtractor {
    pub fn new(config: &ToolPromptConfig) -> Result<Self, TransformError> {
        let marker = regex::escape(config.marker.trim());
        let exec = regex::escape(&config.execution_tool);
        Ok(Self {
            marker: compile("marker", &format!(r"(?m)^{marker}[ \t]*(\w+)[ \t]+(.+)$"))?,
            fenced: compile("fenced", &format!(r"(?s)```\w*\n({exec}\s+.+?)\n```"))?,
            bare: compile("bare", &format!(r"(?m)^{exec}[ \t]+(.+)$"))?,
            blank_runs: compile("blank runs", r"\n{3,}")?,
            execution_tool: config.execution_tool.clone(),
        })
    }

    pub fn extract(&self, text: &str, registry: &ToolRegistry) -> Extraction {
        let mut calls = Vec::new();
        let mut spans: Vec<Range<usize>> = Vec::new();
        let mut discarded = Vec::new();

        for (i, caps) in self.marker.captures_iter(text).enumerate() {
            let (Some(whole), Some(name), Some(args)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let Some(tool) = registry.get(name.as_str()) else {
                discarded.push(name.as_str().to_string());
                continue;
            };
            calls.push(call(
                format!("call_{}_{i}", tool.name),
                &tool.name,
                &tool.argument,
                args.as_str().trim(),
            ));
            spans.push(whole.range());
        }
        if !calls.is_empty() {
            return self.finish(text, spans, calls, ExtractStrategy::Marker, discarded);
        }

        let Some(exec) = registry.get(&self.execution_tool) else {
            return Extraction::unchanged(text, discarded);
        };
        let prefix_len = self.execution_tool.len();

        for (i, caps) in self.fenced.captures_iter(text).enumerate() {
            let (Some(whole), Some(line)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let command = line.as_str().get(prefix_len..).unwrap_or_default().trim();
            calls.push(call(
                format!("call_{}_md_{i}", exec.name),
                &exec.name,
                &exec.argument,
                command,
            ));
            spans.push(whole.range());
        }
        if !calls.is_empty() {
            return self.finish(text, spans, calls, ExtractStrategy::Fenced, discarded);
        }

        for (i, caps) in self.bare.captures_iter(text).enumerate() {
            let (Some(whole), Some(args)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            calls.push(call(
                format!("call_{}_bare_{i}", exec.name),
                &exec.name,
                &exec.argument,
                args.as_str().trim(),
            ));
            spans.push(whole.range());
        }
        if !calls.is_empty() {
            return self.finish(text, spans, calls, ExtractStrategy::Bare, discarded);
        }

        Extraction::unchanged(text, discarded)
    }

    fn finish(
        &self,
        text: &str,
        spans: Vec<Range<usize>>,
        calls: Vec<MessageToolCall>,
        strategy: ExtractStrategy,
        discarded: Vec<String>,
    ) -> Extraction {
        let mut remaining = String::with_capacity(text.len());
        let mut cursor = 0;
        for span in spans {
            remaining.push_str(&text[cursor..span.start]);
            cursor = span.end;
        }
        remaining.push_str(&text[cursor..]);
        let content = self
            .blank_runs
            .replace_all(&remaining, "\n\n")
            .trim()
            .to_string();
        Extraction {
            content,
            calls,
            strategy: Some(strategy),
            discarded,
        }
    }
}

fn call(id: String, name: &str, argument: &str, value: &str) -> MessageToolCall {
    let mut args = Map::new();
    args.insert(argument.to_string(), JsonValue::String(value.to_string()));
    MessageToolCall::function(id, name, &JsonValue::Object(args))
}
