use serde_json::{Value as JsonValue, json};
use toolshim_protocol::ToolDefinition;

use super::*;

fn rules() -> Vec<CommandRuleConfig> {
    serde_json::from_value(json!([
        {
            "name": "skills",
            "pattern": r"(?:^|\]\s*)(?:skills|skill list|/skills)",
            "arguments": {"command": "node skill-manager.mjs list"}
        },
        {
            "name": "enable",
            "pattern": r"(?:^|\]\s*)enable\s+(\S+)",
            "lowercase_captures": true,
            "arguments": {"command": "node skill-manager.mjs enable {1}"}
        },
        {
            "name": "stats",
            "pattern": r"^stats(?:\s|$)",
            "arguments": {"command": "node store.mjs stats"},
            "hint": {"when": "stats", "call": "TOOL_CALL: exec node store.mjs stats"}
        },
        {
            "name": "scout",
            "pattern": r"^scout\s+@?(?P<seed>\S+)",
            "lowercase_captures": true,
            "arguments": {"command": "node scout.mjs --seed {seed}"}
        },
        {
            "name": "consensus",
            "pattern": r"(?s)(?:^|\]\s*)(?:consensus|k-llm)[:\s]+(.+)",
            "quote": "shell",
            "skip_if_contains": ["consensus.mjs", "Tool result"],
            "arguments": {
                "command": "node consensus.mjs --prompt '{1}'{?chat_id: --chatId '{chat_id}'}",
                "timeoutMs": 120000
            }
        },
        {
            "name": "lookup",
            "pattern": r"^lookup\s+(.+)",
            "tool": "web_search"
        }
    ]))
    .unwrap()
}

fn interceptor() -> DirectiveInterceptor {
    let config = DirectiveConfig {
        rules: rules(),
        ..DirectiveConfig::default()
    };
    DirectiveInterceptor::new(&config, &ToolPromptConfig::default()).unwrap()
}

fn registry() -> ToolRegistry {
    ToolRegistry::from_definitions(
        &[
            ToolDefinition::function(
                "exec",
                Some(json!({"type": "object", "properties": {"command": {"type": "string"}}})),
            ),
            ToolDefinition::function(
                "web_search",
                Some(json!({"type": "object", "properties": {"query": {"type": "string"}}})),
            ),
        ],
        "input",
    )
}

fn fired(outcome: DirectiveOutcome) -> (String, Vec<MessageToolCall>) {
    match outcome {
        DirectiveOutcome::Fired { rule, calls } => (rule, calls),
        other => panic!("expected a directive, got {other:?}"),
    }
}

fn arguments(call: &MessageToolCall) -> JsonValue {
    serde_json::from_str(&call.function.arguments).unwrap()
}

#[test]
fn simple_command_fires_once() {
    let messages = vec![Message::system("sys"), Message::user("Stats")];
    let (rule, calls) = fired(interceptor().intercept(&messages, &registry()));
    assert_eq!(rule, "stats");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_stats_0");
    assert_eq!(calls[0].function.name, "exec");
    assert_eq!(arguments(&calls[0]), json!({"command": "node store.mjs stats"}));
}

#[test]
fn rules_are_tried_in_declared_order() {
    let messages = vec![Message::user("[Mon 10:00] enable Weather")];
    let (rule, calls) = fired(interceptor().intercept(&messages, &registry()));
    assert_eq!(rule, "enable");
    assert_eq!(
        arguments(&calls[0]),
        json!({"command": "node skill-manager.mjs enable weather"})
    );
}

#[test]
fn named_captures_are_substituted() {
    let messages = vec![Message::user("scout @RustLang")];
    let (_, calls) = fired(interceptor().intercept(&messages, &registry()));
    assert_eq!(
        arguments(&calls[0]),
        json!({"command": "node scout.mjs --seed rustlang"})
    );
}

#[test]
fn shell_quoting_and_chat_id_section() {
    let envelope = "Conversation info (untrusted metadata):\n```json\n{\"chat\": \"telegram:99887766\"}\n```\n\nconsensus: is it Bob's turn?";
    let (_, calls) = fired(interceptor().intercept(&[Message::user(envelope)], &registry()));
    assert_eq!(
        arguments(&calls[0]),
        json!({
            "command": "node consensus.mjs --prompt 'is it Bob'\\''s turn?' --chatId '99887766'",
            "timeoutMs": 120000
        })
    );

    let (_, calls) = fired(
        interceptor().intercept(&[Message::user("consensus: pick one")], &registry()),
    );
    assert_eq!(
        arguments(&calls[0])["command"],
        json!("node consensus.mjs --prompt 'pick one'")
    );
}

#[test]
fn rule_skip_markers_block_only_that_rule() {
    let messages = vec![Message::user("consensus: Tool result was odd")];
    assert_eq!(
        interceptor().intercept(&messages, &registry()),
        DirectiveOutcome::NoMatch
    );
}

#[test]
fn rule_without_arguments_uses_registered_parameter() {
    let messages = vec![Message::user("lookup rust 2024 edition")];
    let (_, calls) = fired(interceptor().intercept(&messages, &registry()));
    assert_eq!(calls[0].function.name, "web_search");
    assert_eq!(
        arguments(&calls[0]),
        json!({"query": "lookup rust 2024 edition"})
    );
}

#[test]
fn does_not_refire_on_its_own_echo() {
    let interceptor = interceptor();
    let mut messages = vec![Message::user("stats")];
    assert!(matches!(
        interceptor.intercept(&messages, &registry()),
        DirectiveOutcome::Fired { .. }
    ));

    let mut assistant = Message::assistant("");
    assistant.tool_calls = Some(vec![json!({"id": "call_stats_0"})]);
    messages.push(assistant);
    assert_eq!(
        interceptor.intercept(&messages, &registry()),
        DirectiveOutcome::EchoGuard
    );

    let mut result = Message::text(Role::Tool, "42 prospects");
    result.tool_call_id = Some("call_stats_0".to_string());
    messages.push(result);
    messages.push(Message::system("trailing instructions do not count"));
    assert_eq!(
        interceptor.intercept(&messages, &registry()),
        DirectiveOutcome::EchoGuard
    );
}

#[test]
fn echo_marker_in_user_turn_blocks_directive() {
    let messages = vec![Message::user("stats"), Message::user("Exec completed (code 0)")];
    assert_eq!(
        interceptor().intercept(&messages, &registry()),
        DirectiveOutcome::EchoGuard
    );
}

#[test]
fn missing_execution_tool_disables_shortcut() {
    let registry = ToolRegistry::from_definitions(
        &[ToolDefinition::function("web_search", None)],
        "input",
    );
    assert_eq!(
        interceptor().intercept(&[Message::user("stats")], &registry),
        DirectiveOutcome::ToolUnavailable
    );
    assert_eq!(
        interceptor().intercept(&[Message::user("stats")], &ToolRegistry::default()),
        DirectiveOutcome::ToolUnavailable
    );
}

#[test]
fn rules_for_other_tools_fire_without_execution_tool() {
    let registry = ToolRegistry::from_definitions(
        &[ToolDefinition::function("web_search", None)],
        "input",
    );
    let messages = vec![Message::user("lookup rust editions")];
    let (rule, calls) = fired(interceptor().intercept(&messages, &registry));
    assert_eq!(rule, "lookup");
    assert_eq!(calls[0].function.name, "web_search");
    assert_eq!(arguments(&calls[0]), json!({"input": "lookup rust editions"}));
}

#[test]
fn unmatched_text_falls_through() {
    assert_eq!(
        interceptor().intercept(&[Message::user("how are you")], &registry()),
        DirectiveOutcome::NoMatch
    );
    assert_eq!(
        interceptor().intercept(&[Message::system("only instructions")], &registry()),
        DirectiveOutcome::NoUtterance
    );
}

#[test]
fn hints_are_collected_from_rules() {
    let interceptor = interceptor();
    assert_eq!(interceptor.hints().len(), 1);
    assert_eq!(interceptor.hints()[0].when, "stats");
}

#[test]
fn invalid_rule_pattern_is_reported() {
    let config = DirectiveConfig {
        rules: serde_json::from_value(json!([{"name": "bad", "pattern": "("}])).unwrap(),
        ..DirectiveConfig::default()
    };
    let err = DirectiveInterceptor::new(&config, &ToolPromptConfig::default()).unwrap_err();
    assert!(matches!(err, TransformError::InvalidPattern { ref name, .. } if name == "bad"));
}
