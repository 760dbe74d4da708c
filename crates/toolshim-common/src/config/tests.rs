use super::*;
use crate::route::RouteDecision;
use crate::rules::{QuoteStyle, UtteranceFilterConfig};

const SAMPLE: &str = r#"
default_model = "gpt-5.2"
upstream_url = "https://ollama.internal:11434"
reverse_priority = ["gpt-5.2"]
history_window = 6

[[aliases]]
client = "gpt-5"
backend = "llama3.3:latest"

[[aliases]]
client = "gpt-5.2"
backend = "llama3.3:latest"

[[direct_routes]]
client_model = "deepseek-v3"
url = "https://openrouter.ai"
backend_model = "deepseek/deepseek-chat"
credential_env = "OPENROUTER_API_KEY"

[direct_routes.headers]
X-Title = "Agent"

[[directives.rules]]
name = "stats"
pattern = '^stats(?:\s|$)'
arguments = { command = "node scripts/store.mjs stats" }
hint = { when = "stats", call = "TOOL_CALL: exec node scripts/store.mjs stats" }

[[directives.rules]]
name = "consensus"
pattern = '(?s)(?:^|\]\s*)consensus[:\s]+(.+)'
quote = "shell"
skip_if_contains = ["consensus.mjs"]
arguments = { command = "node consensus.mjs --prompt '{1}'", timeoutMs = 120000 }

[[directives.utterance_filters]]
kind = "prefix"
value = "HEARTBEAT"

[upstream]
timeout_secs = 60
"#;

#[test]
fn file_values_override_defaults() {
    let config = ProxyConfig::from_toml(SAMPLE).unwrap();
    assert_eq!(config.history_window, 6);
    assert_eq!(config.upstream.timeout_secs, 60);
    assert_eq!(config.upstream.connect_timeout_secs, 10);
    assert_eq!(config.upstream.retries, 0);
    assert_eq!(config.stream_chunk_size, 100);
    assert_eq!(config.aliases.len(), 2);
    assert_eq!(config.direct_routes[0].path, "/api/v1/chat/completions");
    assert_eq!(
        config.direct_routes[0].strip_params,
        vec!["store", "metadata", "service_tier"]
    );
    assert_eq!(config.directives.rules.len(), 2);
    assert_eq!(config.directives.rules[1].quote, QuoteStyle::Shell);
    assert_eq!(
        config.directives.utterance_filters,
        vec![UtteranceFilterConfig::Prefix {
            value: "HEARTBEAT".to_string()
        }]
    );
    assert_eq!(config.directives.echo_markers, vec!["Exec completed"]);
    assert!(config.unsupported_params.iter().any(|p| p == "tools"));
}

#[test]
fn patch_values_win_over_file_values() {
    let patch = ConfigPatch {
        port: Some(2),
        history_window: Some(8),
        ..ConfigPatch::default()
    };
    let mut config = ProxyConfig::from_toml(SAMPLE).unwrap();
    patch.apply(&mut config);
    assert_eq!(config.port, 2);
    assert_eq!(config.history_window, 8);
    assert_eq!(config.upstream_url, "https://ollama.internal:11434");
    assert_eq!(config.upstream.timeout_secs, 60);
}

#[test]
fn zero_history_window_is_rejected() {
    let patch = ConfigPatch {
        history_window: Some(0),
        ..ConfigPatch::default()
    };
    let err = ProxyConfig::load(None, patch).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid {
            field: "history_window",
            ..
        }
    ));
}

#[test]
fn bad_upstream_url_is_rejected() {
    let patch = ConfigPatch {
        upstream_url: Some("not a url".to_string()),
        ..ConfigPatch::default()
    };
    assert!(matches!(
        ProxyConfig::load(None, patch),
        Err(ConfigError::InvalidUrl { .. })
    ));
}

#[test]
fn routing_table_resolves_credential_env() {
    let config = ProxyConfig::from_toml(SAMPLE).unwrap();
    let table = config
        .routing_table_with(|name| (name == "OPENROUTER_API_KEY").then(|| "sk-or".to_string()))
        .unwrap();
    assert_eq!(table.local.endpoint.port, 11434);
    match table.resolve("deepseek-v3") {
        RouteDecision::Direct(route) => {
            assert_eq!(route.credential.as_deref(), Some("sk-or"));
            assert_eq!(route.backend_model.as_deref(), Some("deepseek/deepseek-chat"));
            assert_eq!(
                route.url("/v1/chat/completions"),
                "https://openrouter.ai:443/api/v1/chat/completions"
            );
            assert_eq!(
                route.headers,
                vec![("X-Title".to_string(), "Agent".to_string())]
            );
        }
        other => panic!("expected direct route, got {other:?}"),
    }
}

#[test]
fn missing_credential_env_leaves_route_unauthenticated() {
    let config = ProxyConfig::from_toml(SAMPLE).unwrap();
    let table = config.routing_table_with(|_| None).unwrap();
    assert!(table.direct[0].credential.is_none());
}

#[test]
fn shipped_example_config_loads() {
    let raw = include_str!("../../../../config/toolshim.example.toml");
    let config = ProxyConfig::from_toml(raw).unwrap();
    config.validate().unwrap();
    assert_eq!(config.aliases.len(), 3);
    assert_eq!(config.directives.rules.len(), 3);
    assert_eq!(config.directives.rules[1].quote, QuoteStyle::Shell);
    assert_eq!(config.direct_routes[0].path, "/api/v1/chat/completions");
    let table = config.routing_table_with(|_| None).unwrap();
    assert!(matches!(table.resolve("kimi-k2"), RouteDecision::Direct(_)));
    assert_eq!(
        table.resolve("gpt-5-mini"),
        RouteDecision::Local {
            backend_model: Some("phi4:latest")
        }
    );
}
