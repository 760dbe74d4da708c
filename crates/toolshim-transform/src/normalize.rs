use toolshim_common::{BackendRoute, RouteDecision, RoutingTable};
use toolshim_protocol::{ChatRequest, Message, MessageContent, Role};

use crate::error::TransformError;
use crate::history::trim_history;
use crate::prompt::{ToolPrompt, inject_instruction};
use crate::registry::ToolRegistry;
use crate::sentinel::SentinelPolicy;

/// Parses an inbound body. Anything that is not a chat request object is
/// malformed.
pub fn parse_request(body: &[u8]) -> Result<ChatRequest, TransformError> {
    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug)]
pub struct NormalizedRequest<'r> {
    /// The body to send upstream.
    pub request: ChatRequest,
    pub route: &'r BackendRoute,
    pub client_model: String,
    pub client_stream: bool,
    /// Tools the client declared, before any stripping.
    pub registry: ToolRegistry,
    pub stripped: Vec<String>,
    pub trimmed: usize,
    pub tool_prompt_injected: bool,
    pub sentinel_stripped: bool,
}

impl NormalizedRequest<'_> {
    pub fn backend_model(&self) -> &str {
        &self.request.model
    }

    pub fn is_direct(&self) -> bool {
        self.route.kind == toolshim_common::RouteKind::Direct
    }
}

/// Rewrites a client request into the shape its backend accepts.
#[derive(Debug)]
pub struct Normalizer {
    routes: RoutingTable,
    history_window: usize,
    fallback_argument: String,
    prompt: ToolPrompt,
    sentinel: SentinelPolicy,
}

impl Normalizer {
    pub fn new(
        routes: RoutingTable,
        history_window: usize,
        fallback_argument: impl Into<String>,
        prompt: ToolPrompt,
        sentinel: SentinelPolicy,
    ) -> Self {
        Self {
            routes,
            history_window: history_window.max(1),
            fallback_argument: fallback_argument.into(),
            prompt,
            sentinel,
        }
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn sentinel(&self) -> &SentinelPolicy {
        &self.sentinel
    }

    pub fn registry_for(&self, request: &ChatRequest) -> ToolRegistry {
        ToolRegistry::from_definitions(request.declared_tools(), &self.fallback_argument)
    }

    pub fn normalize(&self, mut request: ChatRequest) -> NormalizedRequest<'_> {
        let client_model = request.model.clone();
        let client_stream = request.wants_stream();
        let registry = self.registry_for(&request);

        match self.routes.resolve(&client_model) {
            RouteDecision::Direct(route) => {
                let stripped = strip_params(&mut request, &route.strip_params);
                if let Some(model) = route.backend_model.as_ref() {
                    request.model = model.clone();
                }
                request.stream = Some(false);
                NormalizedRequest {
                    request,
                    route,
                    client_model,
                    client_stream,
                    registry,
                    stripped,
                    trimmed: 0,
                    tool_prompt_injected: false,
                    sentinel_stripped: false,
                }
            }
            RouteDecision::Local { backend_model } => {
                let route = &self.routes.local;
                if let Some(model) = backend_model {
                    request.model = model.to_string();
                }
                request.stream = Some(false);
                let stripped = strip_params(&mut request, &route.strip_params);

                let mut tool_prompt_injected = false;
                if stripped.iter().any(|name| name == "tools")
                    && let Some(text) = self.prompt.render(&registry)
                {
                    inject_instruction(&mut request.messages, &text);
                    tool_prompt_injected = true;
                }

                let mut sentinel_stripped = false;
                let messages = std::mem::take(&mut request.messages);
                request.messages = messages
                    .into_iter()
                    .map(|message| self.clean_message(message, &mut sentinel_stripped))
                    .collect();
                let trimmed = trim_history(&mut request.messages, self.history_window);

                NormalizedRequest {
                    request,
                    route,
                    client_model,
                    client_stream,
                    registry,
                    stripped,
                    trimmed,
                    tool_prompt_injected,
                    sentinel_stripped,
                }
            }
        }
    }

    fn clean_message(&self, mut message: Message, sentinel_stripped: &mut bool) -> Message {
        if message.role == Role::Tool {
            let name = message.name.as_deref().unwrap_or("tool");
            let content = message
                .content
                .as_ref()
                .map(MessageContent::joined_text)
                .unwrap_or_default();
            let mut user = Message::user(format!("[Tool result from {name}]: {content}"));
            user.extra = std::mem::take(&mut message.extra);
            return user;
        }

        message.tool_calls = None;
        message.tool_call_id = None;

        match message.role {
            Role::System | Role::Developer => {
                if let Some(content) = message.content.as_mut() {
                    *sentinel_stripped |= self.sentinel.clean_instruction_content(content);
                }
            }
            Role::Assistant => {
                if let Some(placeholder) = self.sentinel.assistant_placeholder(message.content.as_ref())
                {
                    message.content = Some(MessageContent::from(placeholder));
                }
            }
            _ => {}
        }
        message
    }
}

fn strip_params(request: &mut ChatRequest, names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|name| request.remove_param(name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests;
