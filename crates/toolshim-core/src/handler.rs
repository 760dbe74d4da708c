use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, Uri};
use axum::response::Response;
use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::events::EventKind;
use crate::pipeline::Reply;
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-toolshim-request-id";

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub max: Option<String>,
}

/// POST goes through the chat pipeline, GET is forwarded to the local
/// backend.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    let started_at = Instant::now();
    let result = match method {
        Method::POST => state.pipeline.chat(&trace_id, uri.path(), body).await,
        Method::GET => {
            let target = uri
                .path_and_query()
                .map(|value| value.as_str())
                .unwrap_or_else(|| uri.path());
            state.pipeline.passthrough(&trace_id, target).await
        }
        _ => Err(ProxyError::method_not_allowed(format!(
            "{method} is not supported"
        ))),
    };
    respond(&state, &trace_id, started_at, result).await
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    let started_at = Instant::now();
    let result = search(&state, &trace_id, params).await;
    respond(&state, &trace_id, started_at, result).await
}

async fn search(state: &AppState, trace_id: &str, params: SearchParams) -> Result<Reply, ProxyError> {
    let max = match params.max.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            raw.parse::<usize>()
                .map_err(|_| ProxyError::bad_request(format!("invalid max value: {raw}")))?,
        ),
        None => None,
    };
    let hits = state
        .pipeline
        .search(trace_id, params.q.as_deref().unwrap_or_default(), max)
        .await?;
    let body = json!({ "results": hits });
    Ok(Reply {
        status: http::StatusCode::OK,
        content_type: "application/json".to_string(),
        body: Bytes::from(body.to_string()),
        streaming: false,
    })
}

async fn respond(
    state: &AppState,
    trace_id: &str,
    started_at: Instant,
    result: Result<Reply, ProxyError>,
) -> Response {
    let (mut resp, streaming) = match result {
        Ok(reply) => {
            let streaming = reply.streaming;
            (reply_response(reply), streaming)
        }
        Err(err) => (error_response(err), false),
    };
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    state
        .events()
        .record(
            trace_id,
            EventKind::Responded {
                status: resp.status().as_u16(),
                stream: streaming,
                elapsed_ms: started_at.elapsed().as_millis() as u64,
            },
        );
    resp
}

fn reply_response(reply: Reply) -> Response {
    let mut resp = Response::new(Body::from(reply.body));
    *resp.status_mut() = reply.status;
    if let Ok(value) = HeaderValue::from_str(&reply.content_type) {
        resp.headers_mut().insert(CONTENT_TYPE, value);
    }
    if reply.streaming {
        resp.headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }
    resp
}

fn error_response(err: ProxyError) -> Response {
    let mut resp = Response::new(Body::from(err.body));
    *resp.status_mut() = err.status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}
