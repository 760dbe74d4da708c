//! Event-stream framing for chat chunks. Bodies are always complete by the
//! time they are framed or read, so the reader works on a whole body.

/// Payload of the end-of-stream frame.
pub const DONE_MARKER: &str = "[DONE]";

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_MARKER
    }
}

/// Appends one data-only frame (`data: ...\n\n`).
pub fn push_data_frame(out: &mut String, data: &str) {
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
}

pub fn push_done_frame(out: &mut String) {
    push_data_frame(out, DONE_MARKER);
}

/// Frames of a complete event-stream body, in order. Comment lines and
/// fields other than `event`/`data` are skipped; a trailing frame without
/// its blank line still counts.
pub struct SseFrames<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> SseFrames<'a> {
    pub fn new(body: &'a str) -> Self {
        Self {
            lines: body.lines(),
        }
    }
}

impl Iterator for SseFrames<'_> {
    type Item = SseEvent;

    fn next(&mut self) -> Option<SseEvent> {
        let mut event = None;
        let mut data: Option<String> = None;
        for line in self.lines.by_ref() {
            if line.is_empty() {
                if event.is_some() || data.is_some() {
                    break;
                }
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "" => {}
                "event" => event = Some(value.to_string()).filter(|name| !name.is_empty()),
                "data" => match data.as_mut() {
                    Some(joined) => {
                        joined.push('\n');
                        joined.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                },
                _ => {}
            }
        }
        if event.is_none() && data.is_none() {
            return None;
        }
        Some(SseEvent {
            event,
            data: data.unwrap_or_default(),
        })
    }
}

/// Collects every frame of `body`. Invalid UTF-8 is replaced.
pub fn parse_body(body: &[u8]) -> Vec<SseEvent> {
    SseFrames::new(&String::from_utf8_lossy(body)).collect()
}
