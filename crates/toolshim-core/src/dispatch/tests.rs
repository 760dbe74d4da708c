use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use serde_json::json;
use toolshim_common::{ProxyConfig, SentinelConfig, ToolPromptConfig};
use toolshim_transform::{Normalizer, SentinelPolicy, ToolPrompt, parse_request};

use super::*;

#[derive(Default)]
struct ScriptedClient {
    replies: Mutex<VecDeque<Result<UpstreamHttpResponse, UpstreamFailure>>>,
    seen: Mutex<Vec<UpstreamHttpRequest>>,
}

impl ScriptedClient {
    fn with(replies: Vec<Result<UpstreamHttpResponse, UpstreamFailure>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<UpstreamHttpRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl UpstreamClient for ScriptedClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        self.seen.lock().unwrap().push(req);
        let next = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(UpstreamFailure {
                kind: TransportErrorKind::Connect,
                message: "no scripted reply".to_string(),
            })
        });
        Box::pin(async move { next })
    }
}

fn ok(status: u16, content_type: &str, body: &str) -> Result<UpstreamHttpResponse, UpstreamFailure> {
    Ok(UpstreamHttpResponse {
        status,
        headers: vec![("Content-Type".to_string(), content_type.to_string())],
        body: Bytes::from(body.to_string()),
    })
}

fn refused() -> Result<UpstreamHttpResponse, UpstreamFailure> {
    Err(UpstreamFailure {
        kind: TransportErrorKind::Connect,
        message: "connection refused".to_string(),
    })
}

fn normalizer() -> Normalizer {
    let config = ProxyConfig::from_toml(
        r#"
        upstream_url = "http://10.0.0.5:11434"
        api_key = "local-key"

        [[direct_routes]]
        client_model = "kimi"
        url = "https://openrouter.ai"
        backend_model = "moonshotai/kimi-k2"
        credential = "sk-or"
        headers = { "X-Title" = "toolshim" }
        "#,
    )
    .unwrap();
    Normalizer::new(
        config.routing_table_with(|_| None).unwrap(),
        4,
        "input",
        ToolPrompt::new(&ToolPromptConfig::default(), Vec::new()),
        SentinelPolicy::new(&SentinelConfig::default()).unwrap(),
    )
}

fn chat(model: &str) -> toolshim_protocol::ChatRequest {
    parse_request(
        json!({
            "model": model,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "hi"}
            ]
        })
        .to_string()
        .as_bytes(),
    )
    .unwrap()
}

fn sent_json(req: &UpstreamHttpRequest) -> serde_json::Value {
    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap()
}

#[tokio::test]
async fn local_route_posts_to_inbound_path_with_bearer() {
    let client = ScriptedClient::with(vec![ok(200, "application/json", "{}")]);
    let dispatcher = Dispatcher::new(client.clone(), EventHub::new(8), "STAY", 0);
    let n = normalizer();
    let normalized = n.normalize(chat("llama3.3:latest"));

    let reply = dispatcher
        .dispatch("t", &normalized, "/v1/chat/completions")
        .await
        .unwrap();
    assert!(reply.is_success());
    assert!(!reply.folded_stream);

    let seen = client.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, HttpMethod::Post);
    assert_eq!(seen[0].url, "http://10.0.0.5:11434/v1/chat/completions");
    assert!(
        seen[0]
            .headers
            .contains(&("authorization".to_string(), "Bearer local-key".to_string()))
    );
    let body = sent_json(&seen[0]);
    assert_eq!(body["messages"][0]["content"], "Be brief.");
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn direct_route_gets_instruction_and_headers() {
    let client = ScriptedClient::with(vec![ok(200, "application/json", "{}")]);
    let dispatcher = Dispatcher::new(client.clone(), EventHub::new(8), " STAY", 0);
    let n = normalizer();
    let normalized = n.normalize(chat("kimi"));

    dispatcher
        .dispatch("t", &normalized, "/v1/chat/completions")
        .await
        .unwrap();
    let seen = client.seen();
    assert_eq!(seen[0].url, "https://openrouter.ai:443/api/v1/chat/completions");
    assert!(
        seen[0]
            .headers
            .contains(&("authorization".to_string(), "Bearer sk-or".to_string()))
    );
    assert!(
        seen[0]
            .headers
            .contains(&("X-Title".to_string(), "toolshim".to_string()))
    );
    let body = sent_json(&seen[0]);
    assert_eq!(body["model"], "moonshotai/kimi-k2");
    assert_eq!(body["messages"][0]["content"], "Be brief. STAY");
    assert_eq!(normalized.request.messages[0].first_text(), Some("Be brief."));
}

#[tokio::test]
async fn transport_failure_is_not_retried_by_default() {
    let client = ScriptedClient::with(vec![refused(), ok(200, "application/json", "{}")]);
    let dispatcher = Dispatcher::new(client.clone(), EventHub::new(8), "", 0);
    let n = normalizer();
    let normalized = n.normalize(chat("m"));

    let err = dispatcher.dispatch("t", &normalized, "/v1/chat/completions").await;
    assert!(matches!(err, Err(DispatchError::UpstreamUnreachable(_))));
    assert_eq!(client.seen().len(), 1);
}

#[tokio::test]
async fn configured_retries_recover() {
    let client = ScriptedClient::with(vec![refused(), ok(200, "application/json", "{}")]);
    let hub = EventHub::new(16);
    let mut rx = hub.subscribe();
    let dispatcher = Dispatcher::new(client.clone(), hub, "", 1);
    let n = normalizer();
    let normalized = n.normalize(chat("m"));

    let reply = dispatcher
        .dispatch("t", &normalized, "/v1/chat/completions")
        .await
        .unwrap();
    assert_eq!(reply.status, 200);
    assert_eq!(client.seen().len(), 2);

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.kind.name());
    }
    assert_eq!(
        names,
        vec!["upstream_request", "upstream_failed", "upstream_request", "upstream_response"]
    );
}

#[tokio::test]
async fn error_status_with_body_is_a_reply() {
    let client = ScriptedClient::with(vec![ok(404, "application/json", "{\"error\":\"model\"}")]);
    let dispatcher = Dispatcher::new(client, EventHub::new(8), "", 0);
    let n = normalizer();
    let normalized = n.normalize(chat("m"));

    let reply = dispatcher
        .dispatch("t", &normalized, "/v1/chat/completions")
        .await
        .unwrap();
    assert_eq!(reply.status, 404);
    assert!(!reply.is_success());
}

#[tokio::test]
async fn error_status_without_body_is_unreachable() {
    let client = ScriptedClient::with(vec![ok(503, "text/plain", "")]);
    let dispatcher = Dispatcher::new(client, EventHub::new(8), "", 0);
    let n = normalizer();
    let normalized = n.normalize(chat("m"));

    let err = dispatcher.dispatch("t", &normalized, "/v1/chat/completions").await;
    assert!(matches!(err, Err(DispatchError::UpstreamUnreachable(_))));
}

#[tokio::test]
async fn streamed_reply_is_folded() {
    let sse = concat!(
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":5,\"model\":\"m\",",
        "\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":5,\"model\":\"m\",",
        "\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n"
    );
    let client = ScriptedClient::with(vec![ok(200, "text/event-stream", sse)]);
    let dispatcher = Dispatcher::new(client, EventHub::new(8), "", 0);
    let n = normalizer();
    let normalized = n.normalize(chat("m"));

    let reply = dispatcher
        .dispatch("t", &normalized, "/v1/chat/completions")
        .await
        .unwrap();
    assert!(reply.folded_stream);
    assert_eq!(reply.content_type.as_deref(), Some(JSON_CONTENT_TYPE));
    let value: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(value["choices"][0]["message"]["content"], "Hello");
    assert_eq!(value["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn forward_keeps_query_and_skips_body_headers() {
    let client = ScriptedClient::with(vec![ok(200, "application/json", "{\"data\":[]}")]);
    let dispatcher = Dispatcher::new(client.clone(), EventHub::new(8), "", 0);
    let n = normalizer();

    dispatcher
        .forward("t", &n.routes().local, HttpMethod::Get, "/v1/models?limit=2", None)
        .await
        .unwrap();
    let seen = client.seen();
    assert_eq!(seen[0].method, HttpMethod::Get);
    assert_eq!(seen[0].url, "http://10.0.0.5:11434/v1/models?limit=2");
    assert!(seen[0].headers.iter().all(|(name, _)| name != "content-type"));
    assert!(seen[0].body.is_none());
}
