use toolshim_common::{RuleHint, ToolPromptConfig};
use toolshim_protocol::{Message, MessageContent};

use crate::registry::ToolRegistry;

/// Renders the plain-text tool instruction given to backends that cannot
/// accept structured tool definitions.
#[derive(Debug, Clone)]
pub struct ToolPrompt {
    marker: String,
    hints: Vec<RuleHint>,
}

impl ToolPrompt {
    pub fn new(config: &ToolPromptConfig, hints: Vec<RuleHint>) -> Self {
        Self {
            marker: config.marker.clone(),
            hints,
        }
    }

    pub fn render(&self, registry: &ToolRegistry) -> Option<String> {
        if registry.is_empty() {
            return None;
        }
        let names = registry.names().collect::<Vec<_>>().join(", ");
        let mut out = String::from("\n\n## TOOL CALLING\n");
        out.push_str("To use a tool, reply with one line per call in exactly this format:\n");
        out.push_str(&format!("{} <tool_name> <arguments>\n\n", self.marker));
        out.push_str(&format!("Available tools: {names}\n\n"));
        for hint in &self.hints {
            out.push_str(&format!("When the user says '{}': {}\n", hint.when, hint.call));
        }
        if !self.hints.is_empty() {
            out.push('\n');
        }
        out.push_str(
            "Copy the call line exactly as shown. Do not explain it and do not ask questions.\n",
        );
        Some(out)
    }
}

/// Appends `text` to the first system/developer turn. Returns false when
/// there is none.
pub fn append_to_first_instruction(messages: &mut [Message], text: &str) -> bool {
    let Some(message) = messages.iter_mut().find(|m| m.role.is_instruction()) else {
        return false;
    };
    match message.content.as_mut() {
        Some(content) => content.append_text(text),
        None => message.content = Some(MessageContent::from(text.trim_start())),
    }
    true
}

/// Appends to the first system/developer turn, or prepends a new system turn.
pub fn inject_instruction(messages: &mut Vec<Message>, text: &str) {
    if !append_to_first_instruction(messages, text) {
        messages.insert(0, Message::system(text.trim()));
    }
}

#[cfg(test)]
mod tests {
    use toolshim_protocol::{Role, ToolDefinition};

    use super::*;

    fn registry() -> ToolRegistry {
        ToolRegistry::from_definitions(
            &[
                ToolDefinition::function("exec", None),
                ToolDefinition::function("read", None),
            ],
            "input",
        )
    }

    #[test]
    fn render_lists_tools_and_hints() {
        let prompt = ToolPrompt::new(
            &ToolPromptConfig::default(),
            vec![RuleHint {
                when: "stats".to_string(),
                call: "TOOL_CALL: exec node stats.mjs".to_string(),
            }],
        );
        let text = prompt.render(&registry()).unwrap();
        assert!(text.contains("TOOL_CALL: <tool_name> <arguments>"));
        assert!(text.contains("Available tools: exec, read"));
        assert!(text.contains("When the user says 'stats': TOOL_CALL: exec node stats.mjs"));
        assert!(prompt.render(&ToolRegistry::default()).is_none());
    }

    #[test]
    fn inject_prefers_existing_instruction_turn() {
        let mut messages = vec![
            Message::user("hi"),
            Message::text(Role::Developer, "be brief"),
            Message::system("second"),
        ];
        inject_instruction(&mut messages, "\n\nTOOLS");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].first_text(), Some("be brief\n\nTOOLS"));
        assert_eq!(messages[2].first_text(), Some("second"));
    }

    #[test]
    fn inject_prepends_system_turn_when_missing() {
        let mut messages = vec![Message::user("hi")];
        inject_instruction(&mut messages, "\n\nTOOLS");
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].first_text(), Some("TOOLS"));
        assert!(!append_to_first_instruction(&mut [Message::user("x")], "y"));
    }
}
