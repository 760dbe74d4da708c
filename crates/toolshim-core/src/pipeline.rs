use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use toolshim_common::{ProxyConfig, RoutingTable};
use toolshim_protocol::sse::EVENT_STREAM_CONTENT_TYPE;
use toolshim_protocol::{ChatCompletion, ChatRequest, FinishReason, Message};
use toolshim_transform::{
    DirectiveInterceptor, DirectiveOutcome, FinalResponse, ModelNameRewriter, Normalizer,
    SearchHeuristic, SearchHit, SentinelPolicy, ToolCallExtractor, ToolPrompt, ToolRegistry,
    TransformError, inject_results, last_user_text, parse_request,
};
use uuid::Uuid;

use crate::dispatch::{DispatchError, Dispatcher, JSON_CONTENT_TYPE, UpstreamReply};
use crate::error::ProxyError;
use crate::events::{DirectiveSkip, EventHub, EventKind};
use crate::search::SearchProvider;
use crate::upstream::{HttpMethod, UpstreamClient};

/// What goes back to the client.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
    pub streaming: bool,
}

impl Reply {
    fn json(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: JSON_CONTENT_TYPE.to_string(),
            body: body.into(),
            streaming: false,
        }
    }

    fn event_stream(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: EVENT_STREAM_CONTENT_TYPE.to_string(),
            body: body.into(),
            streaming: true,
        }
    }

    fn raw(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            content_type: content_type.unwrap_or(JSON_CONTENT_TYPE).to_string(),
            body: body.into(),
            streaming: false,
        }
    }
}

/// The chat request path: directive shortcut, normalization, optional
/// search context, dispatch, model rewriting, tool-call extraction and
/// response synthesis.
pub struct Pipeline {
    normalizer: Normalizer,
    interceptor: DirectiveInterceptor,
    extractor: ToolCallExtractor,
    rewriter: ModelNameRewriter,
    heuristic: SearchHeuristic,
    search: Option<Arc<dyn SearchProvider>>,
    search_max_results: usize,
    dispatcher: Dispatcher,
    events: EventHub,
    default_model: String,
    chunk_size: usize,
}

impl Pipeline {
    pub fn new(
        config: &ProxyConfig,
        routes: RoutingTable,
        client: Arc<dyn UpstreamClient>,
        search: Option<Arc<dyn SearchProvider>>,
        events: EventHub,
    ) -> Result<Self, TransformError> {
        let interceptor = DirectiveInterceptor::new(&config.directives, &config.tools)?;
        let prompt = ToolPrompt::new(&config.tools, interceptor.hints().to_vec());
        let rewriter = ModelNameRewriter::new(&routes)?;
        let normalizer = Normalizer::new(
            routes,
            config.history_window,
            config.tools.fallback_argument.clone(),
            prompt,
            SentinelPolicy::new(&config.sentinel)?,
        );
        Ok(Self {
            normalizer,
            interceptor,
            extractor: ToolCallExtractor::new(&config.tools)?,
            rewriter,
            heuristic: SearchHeuristic::new(&config.search)?,
            search,
            search_max_results: config.search.max_results,
            dispatcher: Dispatcher::new(
                client,
                events.clone(),
                config.direct_instruction.clone(),
                config.upstream.retries,
            ),
            events,
            default_model: config.default_model.clone(),
            chunk_size: config.stream_chunk_size,
        })
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn has_search(&self) -> bool {
        self.search.is_some()
    }

    pub async fn chat(&self, trace_id: &str, path: &str, body: Bytes) -> Result<Reply, ProxyError> {
        let request = match parse_request(&body) {
            Ok(request) => request,
            Err(err) => return self.degraded(trace_id, path, body, err).await,
        };
        self.events
            .record(
                trace_id,
                EventKind::RequestReceived {
                    method: "POST".to_string(),
                    path: path.to_string(),
                    model: Some(request.model.clone()),
                    stream: request.wants_stream(),
                },
            );

        let registry = self.normalizer.registry_for(&request);
        if let Some(reply) = self.shortcut(trace_id, &request, &registry).await {
            return Ok(reply);
        }

        let mut normalized = self.normalizer.normalize(request);
        self.events
            .record(
                trace_id,
                EventKind::Normalized {
                    route: normalized.route.name.clone(),
                    client_model: normalized.client_model.clone(),
                    backend_model: normalized.backend_model().to_string(),
                    stripped: normalized.stripped.clone(),
                    trimmed: normalized.trimmed,
                    tool_prompt_injected: normalized.tool_prompt_injected,
                    sentinel_stripped: normalized.sentinel_stripped,
                },
            );
        if !normalized.is_direct() {
            self.inject_search(trace_id, &mut normalized.request.messages)
                .await;
        }

        let reply = self
            .dispatcher
            .dispatch(trace_id, &normalized, path)
            .await
            .map_err(dispatch_error)?;
        let body = self.rewriter.rewrite_bytes(
            &reply.body,
            Some(normalized.backend_model()),
            &normalized.client_model,
        );
        if !reply.is_success() {
            return Ok(Reply::raw(reply.status, reply.content_type.as_deref(), body));
        }

        let completion = match serde_json::from_slice::<ChatCompletion>(&body) {
            Ok(completion) => completion,
            Err(err) => return Ok(self.raw_fallback(trace_id, &reply, body, err.to_string()).await),
        };
        let Some(mut response) = FinalResponse::from_completion(&completion) else {
            return Ok(self
                .raw_fallback(trace_id, &reply, body, "completion has no choices".to_string())
                .await);
        };
        if response.model.is_empty() {
            response.model = normalized.client_model.clone();
        }
        if response.id.is_empty() {
            response.id = completion_id();
        }

        self.extract_tool_calls(trace_id, &mut response, &normalized.registry)
            .await;
        self.replace_sentinel(trace_id, &mut response).await;

        match self.render(&response, normalized.client_stream) {
            Ok(rendered) => Ok(rendered),
            Err(err) => Ok(self.raw_fallback(trace_id, &reply, body, err.to_string()).await),
        }
    }

    /// Forwards a GET the proxy does not handle itself.
    pub async fn passthrough(&self, trace_id: &str, path_and_query: &str) -> Result<Reply, ProxyError> {
        self.events
            .record(
                trace_id,
                EventKind::RequestReceived {
                    method: "GET".to_string(),
                    path: path_and_query.to_string(),
                    model: None,
                    stream: false,
                },
            );
        let reply = self
            .dispatcher
            .forward(
                trace_id,
                &self.normalizer.routes().local,
                HttpMethod::Get,
                path_and_query,
                None,
            )
            .await
            .map_err(dispatch_error)?;
        let body = self
            .rewriter
            .rewrite_bytes(&reply.body, None, &self.default_model);
        Ok(Reply::raw(reply.status, reply.content_type.as_deref(), body))
    }

    pub async fn search(
        &self,
        trace_id: &str,
        query: &str,
        max_results: Option<usize>,
    ) -> Result<Vec<SearchHit>, ProxyError> {
        self.events
            .record(
                trace_id,
                EventKind::RequestReceived {
                    method: "GET".to_string(),
                    path: "/v1/search".to_string(),
                    model: None,
                    stream: false,
                },
            );
        let query = query.trim();
        if query.is_empty() {
            return Err(ProxyError::bad_request("Missing q parameter"));
        }
        let Some(provider) = self.search.as_ref() else {
            return Err(ProxyError::service_unavailable("Search not available"));
        };
        let max_results = max_results.unwrap_or(self.search_max_results).max(1);
        match provider.search(query, max_results).await {
            Ok(hits) => Ok(hits),
            Err(err) => {
                self.events
                    .record(
                        trace_id,
                        EventKind::SearchFailed {
                            query: query.to_string(),
                            error: err.to_string(),
                        },
                    );
                Err(ProxyError::internal(err.to_string()))
            }
        }
    }

    async fn shortcut(
        &self,
        trace_id: &str,
        request: &ChatRequest,
        registry: &ToolRegistry,
    ) -> Option<Reply> {
        match self.interceptor.intercept(&request.messages, registry) {
            DirectiveOutcome::Fired { rule, calls } => {
                self.events
                    .record(
                        trace_id,
                        EventKind::DirectiveFired {
                            rule,
                            calls: calls.len(),
                        },
                    );
                let response = FinalResponse::shortcut(completion_id(), request.model.clone(), calls);
                match self.render(&response, request.wants_stream()) {
                    Ok(reply) => Some(reply),
                    Err(err) => {
                        self.events
                            .record(trace_id, EventKind::RawFallback { reason: err.to_string() });
                        None
                    }
                }
            }
            DirectiveOutcome::EchoGuard => {
                self.record_skip(trace_id, DirectiveSkip::EchoGuard);
                None
            }
            DirectiveOutcome::ToolUnavailable => {
                self.record_skip(trace_id, DirectiveSkip::ToolUnavailable);
                None
            }
            DirectiveOutcome::NoUtterance | DirectiveOutcome::NoMatch => None,
        }
    }

    fn record_skip(&self, trace_id: &str, reason: DirectiveSkip) {
        self.events
            .record(trace_id, EventKind::DirectiveSkipped { reason });
    }

    async fn inject_search(&self, trace_id: &str, messages: &mut Vec<Message>) {
        let Some(provider) = self.search.as_ref() else {
            return;
        };
        let query = match last_user_text(messages) {
            Some((_, text)) if self.heuristic.needs_search(text) => self.heuristic.derive_query(text),
            _ => return,
        };
        match provider.search(&query, self.search_max_results).await {
            Ok(hits) => {
                let count = hits.len();
                if inject_results(messages, &hits) {
                    self.events
                        .record(trace_id, EventKind::SearchInjected { query, hits: count });
                }
            }
            Err(err) => {
                self.events
                    .record(
                        trace_id,
                        EventKind::SearchFailed {
                            query,
                            error: err.to_string(),
                        },
                    );
            }
        }
    }

    async fn extract_tool_calls(
        &self,
        trace_id: &str,
        response: &mut FinalResponse,
        registry: &ToolRegistry,
    ) {
        if !response.tool_calls.is_empty() || registry.is_empty() {
            return;
        }
        let Some(extraction) = response
            .content
            .as_deref()
            .map(|text| self.extractor.extract(text, registry))
        else {
            return;
        };
        for tool in &extraction.discarded {
            self.events
                .record(trace_id, EventKind::UnknownToolDiscarded { tool: tool.clone() });
        }
        let Some(strategy) = extraction.strategy else {
            return;
        };
        self.events
            .record(
                trace_id,
                EventKind::ToolCallsExtracted {
                    strategy: strategy.as_str().to_string(),
                    calls: extraction.calls.len(),
                },
            );
        response.content = Some(extraction.content).filter(|text| !text.is_empty());
        response.tool_calls = extraction.calls;
        response.finish_reason = FinishReason::ToolCalls;
    }

    async fn replace_sentinel(&self, trace_id: &str, response: &mut FinalResponse) {
        let sentinel = self.normalizer.sentinel();
        if !response.tool_calls.is_empty()
            || !response
                .content
                .as_deref()
                .is_some_and(|text| sentinel.is_sentinel(text))
        {
            return;
        }
        response.content = Some(sentinel.fallback().to_string());
        self.events
            .record(trace_id, EventKind::SentinelReplaced);
    }

    fn render(&self, response: &FinalResponse, stream: bool) -> Result<Reply, serde_json::Error> {
        if stream {
            return Ok(Reply::event_stream(response.encode_sse(self.chunk_size)?));
        }
        Ok(Reply::json(serde_json::to_vec(&response.render_unary())?))
    }

    async fn raw_fallback(
        &self,
        trace_id: &str,
        reply: &UpstreamReply,
        body: Vec<u8>,
        reason: String,
    ) -> Reply {
        self.events
            .record(trace_id, EventKind::RawFallback { reason });
        Reply::raw(reply.status, reply.content_type.as_deref(), body)
    }

    async fn degraded(
        &self,
        trace_id: &str,
        path: &str,
        body: Bytes,
        err: TransformError,
    ) -> Result<Reply, ProxyError> {
        self.events
            .record(
                trace_id,
                EventKind::Degraded {
                    reason: err.to_string(),
                },
            );
        let reply = self
            .dispatcher
            .forward(
                trace_id,
                &self.normalizer.routes().local,
                HttpMethod::Post,
                path,
                Some(body),
            )
            .await
            .map_err(dispatch_error)?;
        let body = self
            .rewriter
            .rewrite_bytes(&reply.body, None, &self.default_model);
        Ok(Reply::raw(reply.status, reply.content_type.as_deref(), body))
    }
}

fn dispatch_error(err: DispatchError) -> ProxyError {
    match err {
        DispatchError::UpstreamUnreachable(failure) => {
            ProxyError::upstream_unreachable(failure.to_string())
        }
        DispatchError::Encode(err) => ProxyError::internal(err.to_string()),
    }
}

fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}
