use tracing::{info, warn};

use super::{Event, EventSink};

/// Forwards every event to `tracing` under the `toolshim::events` target.
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for TracingEventSink {
    fn write(&self, event: &Event) {
        let detail = serde_json::to_string(&event.kind).unwrap_or_default();
        if event.kind.is_failure() {
            warn!(
                target: "toolshim::events",
                event = event.kind.name(),
                trace_id = %event.trace_id,
                detail = %detail
            );
        } else {
            info!(
                target: "toolshim::events",
                event = event.kind.name(),
                trace_id = %event.trace_id,
                detail = %detail
            );
        }
    }
}

/// Prints one JSON line per event on stderr.
pub struct TerminalEventSink;

impl TerminalEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for TerminalEventSink {
    fn write(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(line) => eprintln!("{line}"),
            Err(err) => {
                eprintln!("{{\"event\":\"event_serialize_error\",\"error\":\"{err}\"}}");
            }
        }
    }
}
