mod hub;
mod sinks;
mod types;

pub use hub::{EventHub, EventSink};
pub use sinks::{TerminalEventSink, TracingEventSink};
pub use types::{DirectiveSkip, Event, EventKind};
