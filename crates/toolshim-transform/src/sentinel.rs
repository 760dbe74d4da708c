use regex::Regex;
use toolshim_common::SentinelConfig;
use toolshim_protocol::MessageContent;

use crate::error::{TransformError, compile};

/// Handling of the "no answer" sentinel a client may instruct the model to use.
#[derive(Debug, Clone)]
pub struct SentinelPolicy {
    config: SentinelConfig,
    line: Regex,
    blank_runs: Regex,
}

impl SentinelPolicy {
    pub fn new(config: &SentinelConfig) -> Result<Self, TransformError> {
        // NO_REPLY also matches no-reply, "no reply" and noreply.
        let token = config
            .token
            .split('_')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"[_\-\s]?");
        Ok(Self {
            config: config.clone(),
            line: compile("sentinel", &format!(r"(?i)[^\n]*\b{token}\b[^\n]*"))?,
            blank_runs: compile("sentinel", r"\n{3,}")?,
        })
    }

    /// Drops every line mentioning the sentinel and appends the override.
    /// Returns the rewritten text and whether anything was removed.
    pub fn clean_instruction(&self, text: &str) -> (String, bool) {
        let stripped = self.line.replace_all(text, "");
        let removed = stripped.len() != text.len();
        let mut out = self.blank_runs.replace_all(&stripped, "\n\n").into_owned();
        out.push_str(&self.config.system_override);
        (out, removed)
    }

    pub fn clean_instruction_content(&self, content: &mut MessageContent) -> bool {
        let mut removed = false;
        content.map_text(|text| {
            let (out, hit) = self.clean_instruction(text);
            removed |= hit;
            out
        });
        removed
    }

    /// Replacement for an assistant turn that is just the sentinel or empty.
    pub fn assistant_placeholder(&self, content: Option<&MessageContent>) -> Option<&str> {
        match content {
            Some(MessageContent::Text(text)) if self.is_sentinel(text) => {
                Some(self.config.thinking_placeholder.as_str())
            }
            Some(MessageContent::Text(text)) if text.is_empty() => {
                Some(self.config.empty_placeholder.as_str())
            }
            Some(MessageContent::Parts(parts)) if parts.is_empty() => {
                Some(self.config.empty_placeholder.as_str())
            }
            None => Some(self.config.empty_placeholder.as_str()),
            _ => None,
        }
    }

    pub fn is_sentinel(&self, text: &str) -> bool {
        text.trim().eq_ignore_ascii_case(&self.config.token)
    }

    pub fn fallback(&self) -> &str {
        &self.config.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SentinelPolicy {
        SentinelPolicy::new(&SentinelConfig::default()).unwrap()
    }

    #[test]
    fn instruction_lines_mentioning_sentinel_are_removed() {
        let text = "Be helpful.\nIf nothing to say, answer NO_REPLY.\n\n\nAlso no-reply is fine.\nEnd.";
        let (out, removed) = policy().clean_instruction(text);
        assert!(removed);
        assert!(!out.to_lowercase().contains("answer no_reply"));
        assert!(!out.contains("no-reply is fine"));
        assert!(out.starts_with("Be helpful.\n\nEnd."));
        assert!(out.ends_with(&SentinelConfig::default().system_override));
    }

    #[test]
    fn override_is_appended_even_without_sentinel() {
        let (out, removed) = policy().clean_instruction("plain");
        assert!(!removed);
        assert!(out.starts_with("plain\n\nIMPORTANT OVERRIDE"));
    }

    #[test]
    fn assistant_placeholders() {
        let policy = policy();
        assert_eq!(
            policy.assistant_placeholder(Some(&MessageContent::from(" no_reply "))),
            Some("(thinking...)")
        );
        assert_eq!(
            policy.assistant_placeholder(Some(&MessageContent::from(""))),
            Some("(no response)")
        );
        assert_eq!(policy.assistant_placeholder(None), Some("(no response)"));
        assert_eq!(
            policy.assistant_placeholder(Some(&MessageContent::from("hello"))),
            None
        );
    }
}
