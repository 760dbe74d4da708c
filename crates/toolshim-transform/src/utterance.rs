use regex::Regex;
use toolshim_common::UtteranceFilterConfig;
use toolshim_protocol::{Message, Role};

use crate::error::{TransformError, compile};

/// Decides whether a user-role text was produced by automation rather than a
/// person. Implement it to extend the filter set.
pub trait UtterancePredicate: Send + Sync {
    fn is_synthetic(&self, text: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct Prefix(pub String);

impl UtterancePredicate for Prefix {
    fn is_synthetic(&self, text: &str) -> bool {
        text.starts_with(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Contains {
    needle: String,
    case_insensitive: bool,
}

impl Contains {
    pub fn new(needle: &str, case_insensitive: bool) -> Self {
        let needle = if case_insensitive {
            needle.to_lowercase()
        } else {
            needle.to_string()
        };
        Self {
            needle,
            case_insensitive,
        }
    }
}

impl UtterancePredicate for Contains {
    fn is_synthetic(&self, text: &str) -> bool {
        if self.case_insensitive {
            text.to_lowercase().contains(&self.needle)
        } else {
            text.contains(&self.needle)
        }
    }
}

/// Matches when the needle occurs within the first `within` characters.
#[derive(Debug, Clone)]
pub struct ContainsWithin {
    pub needle: String,
    pub within: usize,
}

impl UtterancePredicate for ContainsWithin {
    fn is_synthetic(&self, text: &str) -> bool {
        let end = text
            .char_indices()
            .nth(self.within)
            .map(|(idx, _)| idx)
            .unwrap_or(text.len());
        text[..end].contains(&self.needle)
    }
}

#[derive(Debug, Clone)]
pub struct Matches(pub Regex);

impl UtterancePredicate for Matches {
    fn is_synthetic(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

#[derive(Default)]
pub struct UtteranceFilter {
    predicates: Vec<Box<dyn UtterancePredicate>>,
}

impl UtteranceFilter {
    pub fn from_config(filters: &[UtteranceFilterConfig]) -> Result<Self, TransformError> {
        let mut out = Self::default();
        for filter in filters {
            out = match filter {
                UtteranceFilterConfig::Prefix { value } => out.with(Prefix(value.clone())),
                UtteranceFilterConfig::Contains {
                    value,
                    case_insensitive,
                } => out.with(Contains::new(value, *case_insensitive)),
                UtteranceFilterConfig::ContainsWithin { value, within } => {
                    out.with(ContainsWithin {
                        needle: value.clone(),
                        within: *within,
                    })
                }
                UtteranceFilterConfig::Regex { pattern } => {
                    out.with(Matches(compile("utterance filter", pattern)?))
                }
            };
        }
        Ok(out)
    }

    pub fn with(mut self, predicate: impl UtterancePredicate + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    pub fn is_synthetic(&self, text: &str) -> bool {
        self.predicates
            .iter()
            .any(|predicate| predicate.is_synthetic(text))
    }
}

impl std::fmt::Debug for UtteranceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtteranceFilter")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    /// Chat id captured from a conversation metadata envelope.
    pub chat_id: Option<String>,
}

/// Finds the newest genuine user utterance, unwrapping metadata envelopes
/// and skipping synthetic turns.
#[derive(Debug)]
pub struct UtteranceLocator {
    metadata_prefix: String,
    chat_id: Regex,
    after_fence: Regex,
    after_paragraph: Regex,
    filter: UtteranceFilter,
}

impl UtteranceLocator {
    pub fn new(metadata_prefix: &str, filter: UtteranceFilter) -> Result<Self, TransformError> {
        Ok(Self {
            metadata_prefix: metadata_prefix.to_string(),
            chat_id: compile("chat id", r"(?:id:|telegram:)(\d{5,})")?,
            after_fence: compile("metadata fence", r"(?s)```\s*\n\n(.+)")?,
            after_paragraph: compile("metadata paragraph", r"(?s)\n\n([^\n].+)")?,
            filter,
        })
    }

    pub fn locate(&self, messages: &[Message]) -> Option<Utterance> {
        let mut chat_id: Option<String> = None;
        for message in messages.iter().rev() {
            if message.role != Role::User {
                continue;
            }
            let raw = message.first_text().unwrap_or_default();
            let mut text = raw;

            if !self.metadata_prefix.is_empty() && raw.trim().starts_with(&self.metadata_prefix) {
                if chat_id.is_none() {
                    chat_id = self
                        .chat_id
                        .captures(raw)
                        .and_then(|caps| caps.get(1))
                        .map(|m| m.as_str().to_string());
                }
                match self.unwrap_envelope(raw) {
                    Some(inner) => text = inner,
                    None => continue,
                }
            }

            let trimmed = text.trim();
            if self.filter.is_synthetic(trimmed) {
                continue;
            }
            if trimmed.is_empty() {
                return None;
            }
            return Some(Utterance {
                text: text.to_string(),
                chat_id,
            });
        }
        None
    }

    fn unwrap_envelope<'t>(&self, raw: &'t str) -> Option<&'t str> {
        if let Some(caps) = self.after_fence.captures(raw) {
            return caps.get(1).map(|m| m.as_str().trim());
        }
        let candidate = self.after_paragraph.captures(raw)?.get(1)?.as_str().trim();
        if candidate.starts_with("```") || candidate.starts_with('{') {
            return None;
        }
        Some(candidate)
    }
}

#[cfg(test)]
mod tests;
