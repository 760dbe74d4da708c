use toolshim_protocol::sse::{push_data_frame, push_done_frame};
use toolshim_protocol::{
    ChatCompletion, ChatCompletionChoice, ChatCompletionChunk, ChatCompletionChunkObjectType,
    ChatCompletionObjectType, ChunkChoice, ChunkDelta, FinishReason, MessageToolCall, Passthrough,
    ResponseMessage, Role, ToolCallChunk, ToolCallChunkFunction, ToolCallType, Usage,
};

/// The logical answer handed to the client, whatever produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResponse {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub content: Option<String>,
    pub tool_calls: Vec<MessageToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Role,
    ContentDelta(String),
    ToolCallDelta { index: i64, call: MessageToolCall },
    Terminal {
        finish_reason: FinishReason,
        usage: Option<Usage>,
    },
    Done,
}

impl FinalResponse {
    /// A tool-call-only answer produced without a backend.
    pub fn shortcut(id: impl Into<String>, model: impl Into<String>, calls: Vec<MessageToolCall>) -> Self {
        Self {
            id: id.into(),
            created: now_unix(),
            model: model.into(),
            content: None,
            tool_calls: calls,
            finish_reason: FinishReason::ToolCalls,
            usage: Some(Usage::default()),
        }
    }

    /// Reads the first choice of a unary completion.
    pub fn from_completion(completion: &ChatCompletion) -> Option<Self> {
        let choice = completion.primary()?;
        Some(Self {
            id: completion.id.clone(),
            created: completion.created,
            model: completion.model.clone(),
            content: choice.message.content.clone(),
            tool_calls: choice.message.tool_calls.clone().unwrap_or_default(),
            finish_reason: choice.finish_reason.clone().unwrap_or(FinishReason::Stop),
            usage: completion.usage.clone(),
        })
    }

    pub fn render_unary(&self) -> ChatCompletion {
        let tool_calls = (!self.tool_calls.is_empty()).then(|| self.tool_calls.clone());
        ChatCompletion {
            id: self.id.clone(),
            object: ChatCompletionObjectType::ChatCompletion,
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ResponseMessage::assistant(self.content.clone(), tool_calls),
                finish_reason: Some(self.finish_reason.clone()),
                extra: Passthrough::new(),
            }],
            usage: self.usage.clone(),
            extra: Passthrough::new(),
        }
    }

    /// Role announcement, content deltas of at most `chunk_size` characters,
    /// one delta per tool call, the terminal event and the end marker.
    pub fn stream_events(&self, chunk_size: usize) -> Vec<StreamEvent> {
        let mut events = vec![StreamEvent::Role];
        if let Some(content) = self.content.as_deref() {
            events.extend(chunk_chars(content, chunk_size.max(1)).map(StreamEvent::ContentDelta));
        }
        for (index, call) in self.tool_calls.iter().enumerate() {
            events.push(StreamEvent::ToolCallDelta {
                index: index as i64,
                call: call.clone(),
            });
        }
        events.push(StreamEvent::Terminal {
            finish_reason: self.finish_reason.clone(),
            usage: self.usage.clone(),
        });
        events.push(StreamEvent::Done);
        events
    }

    pub fn chunk_for(&self, event: &StreamEvent) -> Option<ChatCompletionChunk> {
        let (delta, finish_reason, usage) = match event {
            StreamEvent::Role => {
                let content = if self.has_text() || self.tool_calls.is_empty() {
                    Some(String::new())
                } else {
                    None
                };
                (
                    ChunkDelta {
                        role: Some(Role::Assistant),
                        content,
                        tool_calls: None,
                    },
                    None,
                    None,
                )
            }
            StreamEvent::ContentDelta(piece) => (
                ChunkDelta {
                    content: Some(piece.clone()),
                    ..ChunkDelta::default()
                },
                None,
                None,
            ),
            StreamEvent::ToolCallDelta { index, call } => (
                ChunkDelta {
                    tool_calls: Some(vec![ToolCallChunk {
                        index: *index,
                        id: Some(call.id.clone()),
                        kind: Some(ToolCallType::Function),
                        function: Some(ToolCallChunkFunction {
                            name: Some(call.function.name.clone()),
                            arguments: Some(call.function.arguments.clone()),
                        }),
                    }]),
                    ..ChunkDelta::default()
                },
                None,
                None,
            ),
            StreamEvent::Terminal {
                finish_reason,
                usage,
            } => (
                ChunkDelta::default(),
                Some(finish_reason.clone()),
                usage.clone(),
            ),
            StreamEvent::Done => return None,
        };
        Some(ChatCompletionChunk {
            id: self.id.clone(),
            object: ChatCompletionChunkObjectType::ChatCompletionChunk,
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        })
    }

    /// Frames the whole event sequence as `data:` lines.
    pub fn encode_sse(&self, chunk_size: usize) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for event in self.stream_events(chunk_size) {
            match self.chunk_for(&event) {
                Some(chunk) => push_data_frame(&mut out, &serde_json::to_string(&chunk)?),
                None => push_done_frame(&mut out),
            }
        }
        Ok(out)
    }

    fn has_text(&self) -> bool {
        self.content.as_deref().is_some_and(|content| !content.is_empty())
    }
}

fn chunk_chars(text: &str, size: usize) -> impl Iterator<Item = String> + '_ {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let end = rest
            .char_indices()
            .nth(size)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(head.to_string())
    })
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
