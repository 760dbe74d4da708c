use serde_json::json;
use toolshim_common::{ProxyConfig, RuleHint, SentinelConfig, ToolPromptConfig};

use super::*;

fn normalizer(window: usize) -> Normalizer {
    let config = ProxyConfig::from_toml(
        r#"
        [[aliases]]
        client = "gpt-5"
        backend = "llama3.3:latest"

        [[direct_routes]]
        client_model = "deepseek-v3"
        url = "https://openrouter.ai"
        backend_model = "deepseek/deepseek-chat"
        "#,
    )
    .unwrap();
    let routes = config.routing_table_with(|_| None).unwrap();
    let prompt = ToolPrompt::new(
        &ToolPromptConfig::default(),
        vec![RuleHint {
            when: "stats".to_string(),
            call: "TOOL_CALL: exec stats".to_string(),
        }],
    );
    let sentinel = SentinelPolicy::new(&SentinelConfig::default()).unwrap();
    Normalizer::new(routes, window, "input", prompt, sentinel)
}

fn request(value: serde_json::Value) -> ChatRequest {
    parse_request(value.to_string().as_bytes()).unwrap()
}

#[test]
fn malformed_body_is_reported() {
    assert!(matches!(
        parse_request(b"{not json"),
        Err(TransformError::MalformedRequest(_))
    ));
    assert!(parse_request(b"[1,2]").is_err());
}

#[test]
fn local_route_substitutes_alias_and_strips_params() {
    let n = normalizer(4);
    let out = n.normalize(request(json!({
        "model": "gpt-5",
        "stream": true,
        "store": true,
        "metadata": {"a": 1},
        "temperature": 0.3,
        "messages": [{"role": "user", "content": "hi"}]
    })));
    assert!(!out.is_direct());
    assert_eq!(out.client_model, "gpt-5");
    assert_eq!(out.backend_model(), "llama3.3:latest");
    assert!(out.client_stream);
    assert_eq!(out.request.stream, Some(false));
    assert_eq!(out.stripped, vec!["store", "metadata"]);

    let body = serde_json::to_value(&out.request).unwrap();
    assert!(body.get("store").is_none());
    assert!(body.get("metadata").is_none());
    assert_eq!(body["temperature"], json!(0.3));
    assert_eq!(body["stream"], json!(false));
}

#[test]
fn unknown_model_keeps_client_id() {
    let normalizer = normalizer(4);
    let out = normalizer.normalize(request(json!({"model": "mystery", "messages": []})));
    assert_eq!(out.backend_model(), "mystery");
    assert_eq!(out.request.stream, Some(false));
}

#[test]
fn stripped_tools_become_instruction_text() {
    let normalizer = normalizer(4);
    let out = normalizer.normalize(request(json!({
        "model": "gpt-5",
        "tools": [{"type": "function", "function": {"name": "exec",
            "parameters": {"type": "object", "properties": {"command": {"type": "string"}}}}}],
        "tool_choice": "auto",
        "messages": [{"role": "user", "content": "stats"}]
    })));
    assert!(out.tool_prompt_injected);
    assert!(out.request.tools.is_none());
    assert!(out.registry.contains("exec"));
    let system = &out.request.messages[0];
    assert_eq!(system.role, Role::System);
    let text = system.first_text().unwrap();
    assert!(text.starts_with("## TOOL CALLING"));
    assert!(text.contains("Available tools: exec"));
    assert!(text.contains("When the user says 'stats'"));
}

#[test]
fn tool_turns_become_user_turns() {
    let normalizer = normalizer(8);
    let out = normalizer.normalize(request(json!({
        "model": "gpt-5",
        "messages": [
            {"role": "user", "content": "stats"},
            {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_stats_0", "type": "function", "function": {"name": "exec", "arguments": "{}"}}
            ]},
            {"role": "tool", "tool_call_id": "call_stats_0", "name": "exec", "content": "42 prospects"}
        ]
    })));
    let body = serde_json::to_value(&out.request).unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages[1], json!({"role": "assistant", "content": "(no response)"}));
    assert_eq!(
        messages[2],
        json!({"role": "user", "content": "[Tool result from exec]: 42 prospects"})
    );
}

#[test]
fn sentinel_is_scrubbed_from_instructions_and_history() {
    let normalizer = normalizer(8);
    let out = normalizer.normalize(request(json!({
        "model": "gpt-5",
        "messages": [
            {"role": "system", "content": [
                {"type": "text", "text": "Be kind.\nReply NO_REPLY when idle."}
            ]},
            {"role": "user", "content": "hello"},
            {"role": "assistant", "content": "NO_REPLY"},
            {"role": "user", "content": "still there?"}
        ]
    })));
    assert!(out.sentinel_stripped);
    let system = out.request.messages[0].first_text().unwrap();
    assert!(system.starts_with("Be kind.\n"));
    assert!(!system.contains("when idle"));
    assert!(system.contains("IMPORTANT OVERRIDE"));
    assert_eq!(out.request.messages[2].first_text(), Some("(thinking...)"));
}

#[test]
fn history_is_trimmed_after_cleanup() {
    let mut messages = vec![json!({"role": "system", "content": "s"})];
    for i in 0..6 {
        messages.push(json!({"role": "user", "content": format!("u{i}")}));
    }
    let normalizer = normalizer(4);
    let out = normalizer.normalize(request(json!({"model": "gpt-5", "messages": messages})));
    assert_eq!(out.trimmed, 2);
    assert_eq!(out.request.messages.len(), 5);
    assert_eq!(out.request.messages[1].first_text(), Some("u2"));
}

#[test]
fn direct_route_skips_local_rewrites() {
    let normalizer = normalizer(1);
    let out = normalizer.normalize(request(json!({
        "model": "deepseek-v3",
        "stream": true,
        "store": true,
        "tools": [{"type": "function", "function": {"name": "exec"}}],
        "messages": [
            {"role": "system", "content": "NO_REPLY if idle"},
            {"role": "user", "content": "a"},
            {"role": "user", "content": "b"}
        ]
    })));
    assert!(out.is_direct());
    assert_eq!(out.backend_model(), "deepseek/deepseek-chat");
    assert_eq!(out.client_model, "deepseek-v3");
    assert_eq!(out.stripped, vec!["store"]);
    assert!(out.request.tools.is_some());
    assert_eq!(out.request.messages.len(), 3);
    assert_eq!(out.request.messages[0].first_text(), Some("NO_REPLY if idle"));
    assert_eq!(out.request.stream, Some(false));
}
