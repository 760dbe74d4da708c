use serde::{Deserialize, Serialize};

use crate::upstream::TransportErrorKind;

/// One observable step of a request, keyed by its trace id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub trace_id: String,
    /// Unix milliseconds.
    pub at_ms: i64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(trace_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            trace_id: trace_id.into(),
            at_ms: (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    RequestReceived {
        method: String,
        path: String,
        model: Option<String>,
        stream: bool,
    },
    /// The body was not a chat request and went upstream verbatim.
    Degraded {
        reason: String,
    },
    DirectiveFired {
        rule: String,
        calls: usize,
    },
    DirectiveSkipped {
        reason: DirectiveSkip,
    },
    Normalized {
        route: String,
        client_model: String,
        backend_model: String,
        stripped: Vec<String>,
        trimmed: usize,
        tool_prompt_injected: bool,
        sentinel_stripped: bool,
    },
    SearchInjected {
        query: String,
        hits: usize,
    },
    SearchFailed {
        query: String,
        error: String,
    },
    UpstreamRequest {
        route: String,
        url: String,
        attempt: u32,
    },
    UpstreamResponse {
        route: String,
        status: u16,
        bytes: usize,
        elapsed_ms: u64,
        folded_stream: bool,
    },
    UpstreamFailed {
        route: String,
        attempt: u32,
        kind: TransportErrorKind,
        message: String,
    },
    ToolCallsExtracted {
        strategy: String,
        calls: usize,
    },
    UnknownToolDiscarded {
        tool: String,
    },
    SentinelReplaced,
    /// The reply could not be re-encoded and the raw backend body was sent.
    RawFallback {
        reason: String,
    },
    Responded {
        status: u16,
        stream: bool,
        elapsed_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveSkip {
    EchoGuard,
    ToolUnavailable,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::RequestReceived { .. } => "request_received",
            EventKind::Degraded { .. } => "degraded",
            EventKind::DirectiveFired { .. } => "directive_fired",
            EventKind::DirectiveSkipped { .. } => "directive_skipped",
            EventKind::Normalized { .. } => "normalized",
            EventKind::SearchInjected { .. } => "search_injected",
            EventKind::SearchFailed { .. } => "search_failed",
            EventKind::UpstreamRequest { .. } => "upstream_request",
            EventKind::UpstreamResponse { .. } => "upstream_response",
            EventKind::UpstreamFailed { .. } => "upstream_failed",
            EventKind::ToolCallsExtracted { .. } => "tool_calls_extracted",
            EventKind::UnknownToolDiscarded { .. } => "unknown_tool_discarded",
            EventKind::SentinelReplaced => "sentinel_replaced",
            EventKind::RawFallback { .. } => "raw_fallback",
            EventKind::Responded { .. } => "responded",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventKind::Degraded { .. }
                | EventKind::SearchFailed { .. }
                | EventKind::UpstreamFailed { .. }
                | EventKind::RawFallback { .. }
        )
    }
}
