use std::sync::Arc;

use tokio::sync::broadcast;

use super::types::{Event, EventKind};

/// Receives every recorded event on the recording task. Writes must not
/// block; sinks that need I/O should hand off to their own task.
pub trait EventSink: Send + Sync {
    fn write(&self, event: &Event);
}

/// Request-event fan-out. Sinks are fixed when the hub is built; live
/// subscribers (tests, diagnostics) attach through [`EventHub::subscribe`].
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Event>,
    sinks: Arc<[Arc<dyn EventSink>]>,
}

impl EventHub {
    pub fn new(buffer: usize) -> Self {
        Self::with_sinks(buffer, Vec::new())
    }

    pub fn with_sinks(buffer: usize, sinks: Vec<Arc<dyn EventSink>>) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            sinks: sinks.into(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Records `kind` under `trace_id`: sinks first, in registration
    /// order, then subscribers. Having no subscribers is not an error.
    pub fn record(&self, trace_id: &str, kind: EventKind) {
        let event = Event::new(trace_id, kind);
        for sink in self.sinks.iter() {
            sink.write(&event);
        }
        let _ = self.tx.send(event);
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("sinks", &self.sinks.len())
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}
