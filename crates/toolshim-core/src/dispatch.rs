use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use toolshim_common::BackendRoute;
use toolshim_transform::{NormalizedRequest, append_to_first_instruction, fold_event_stream};

use crate::events::{EventHub, EventKind};
use crate::upstream::{
    HttpMethod, TransportErrorKind, UpstreamClient, UpstreamFailure, UpstreamHttpRequest,
    UpstreamHttpResponse,
};

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[from] UpstreamFailure),
    #[error("failed to encode upstream request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A fully read backend reply.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    /// The backend streamed although asked not to; `body` holds the folded
    /// unary completion.
    pub folded_stream: bool,
}

impl UpstreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn from_response(resp: UpstreamHttpResponse) -> Self {
        Self {
            status: resp.status,
            content_type: resp.header("content-type").map(str::to_string),
            body: resp.body,
            folded_stream: false,
        }
    }

    fn looks_streamed(&self) -> bool {
        if self
            .content_type
            .as_deref()
            .is_some_and(|value| value.contains("text/event-stream"))
        {
            return true;
        }
        self.body.trim_ascii_start().starts_with(b"data:")
    }

    fn fold_stream(mut self) -> Result<Self, serde_json::Error> {
        if !self.is_success() || !self.looks_streamed() {
            return Ok(self);
        }
        if let Some(completion) = fold_event_stream(&self.body) {
            self.body = Bytes::from(serde_json::to_vec(&completion)?);
            self.content_type = Some(JSON_CONTENT_TYPE.to_string());
            self.folded_stream = true;
        }
        Ok(self)
    }
}

/// Performs the outbound call for a route. One unary request per attempt,
/// body read in full before returning.
pub struct Dispatcher {
    client: Arc<dyn UpstreamClient>,
    events: EventHub,
    direct_instruction: String,
    retries: u32,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        events: EventHub,
        direct_instruction: impl Into<String>,
        retries: u32,
    ) -> Self {
        Self {
            client,
            events,
            direct_instruction: direct_instruction.into(),
            retries,
        }
    }

    pub async fn dispatch(
        &self,
        trace_id: &str,
        normalized: &NormalizedRequest<'_>,
        inbound_path: &str,
    ) -> Result<UpstreamReply, DispatchError> {
        let route = normalized.route;
        let body = if normalized.is_direct() && !self.direct_instruction.is_empty() {
            let mut request = normalized.request.clone();
            append_to_first_instruction(&mut request.messages, &self.direct_instruction);
            serde_json::to_vec(&request)?
        } else {
            serde_json::to_vec(&normalized.request)?
        };
        let req = UpstreamHttpRequest {
            method: HttpMethod::Post,
            url: route.url(inbound_path),
            headers: request_headers(route, true),
            body: Some(Bytes::from(body)),
        };
        self.send(trace_id, route, req).await
    }

    /// Forwards a request the pipeline does not interpret, such as a model
    /// listing or an unparseable chat body.
    pub async fn forward(
        &self,
        trace_id: &str,
        route: &BackendRoute,
        method: HttpMethod,
        path_and_query: &str,
        body: Option<Bytes>,
    ) -> Result<UpstreamReply, DispatchError> {
        let req = UpstreamHttpRequest {
            method,
            url: route.endpoint.url_for(path_and_query),
            headers: request_headers(route, body.is_some()),
            body,
        };
        self.send(trace_id, route, req).await
    }

    async fn send(
        &self,
        trace_id: &str,
        route: &BackendRoute,
        req: UpstreamHttpRequest,
    ) -> Result<UpstreamReply, DispatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.events
                .record(
                    trace_id,
                    EventKind::UpstreamRequest {
                        route: route.name.clone(),
                        url: req.url.clone(),
                        attempt,
                    },
                );
            let started = Instant::now();
            let failure = match self.client.send(req.clone()).await {
                Ok(resp) if !(200..300).contains(&resp.status) && resp.body.is_empty() => {
                    UpstreamFailure {
                        kind: TransportErrorKind::Other,
                        message: format!("upstream answered {} with an empty body", resp.status),
                    }
                }
                Ok(resp) => {
                    let reply = UpstreamReply::from_response(resp).fold_stream()?;
                    self.events
                        .record(
                            trace_id,
                            EventKind::UpstreamResponse {
                                route: route.name.clone(),
                                status: reply.status,
                                bytes: reply.body.len(),
                                elapsed_ms: started.elapsed().as_millis() as u64,
                                folded_stream: reply.folded_stream,
                            },
                        );
                    return Ok(reply);
                }
                Err(failure) => failure,
            };
            self.events
                .record(
                    trace_id,
                    EventKind::UpstreamFailed {
                        route: route.name.clone(),
                        attempt,
                        kind: failure.kind,
                        message: failure.message.clone(),
                    },
                );
            if attempt > self.retries {
                return Err(DispatchError::UpstreamUnreachable(failure));
            }
        }
    }
}

fn request_headers(route: &BackendRoute, has_body: bool) -> Vec<(String, String)> {
    let mut headers = Vec::with_capacity(route.headers.len() + 2);
    if has_body {
        headers.push(("content-type".to_string(), JSON_CONTENT_TYPE.to_string()));
    }
    if let Some(credential) = route.credential.as_deref() {
        headers.push(("authorization".to_string(), format!("Bearer {credential}")));
    }
    headers.extend(route.headers.iter().cloned());
    headers
}

#[cfg(test)]
mod tests;
