use std::collections::BTreeMap;

use toolshim_protocol::sse::SseFrames;
use toolshim_protocol::{
    ChatCompletion, ChatCompletionChoice, ChatCompletionChunk, ChatCompletionObjectType,
    FinishReason, FunctionCall, MessageToolCall, Passthrough, ResponseMessage, ToolCallType,
    Usage,
};

#[derive(Debug, Clone, Default)]
struct ToolCallState {
    id: Option<String>,
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Default)]
struct ChoiceState {
    content: String,
    saw_content: bool,
    tool_calls: BTreeMap<i64, ToolCallState>,
    finish_reason: Option<FinishReason>,
}

/// Folds streamed chunks back into one unary completion, for backends that
/// answer with an event stream although none was requested.
#[derive(Debug, Clone, Default)]
pub struct ChunkAccumulator {
    id: String,
    model: String,
    created: i64,
    usage: Option<Usage>,
    choices: BTreeMap<i64, ChoiceState>,
    chunks: usize,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: ChatCompletionChunk) {
        self.chunks += 1;
        if !chunk.id.is_empty() {
            self.id = chunk.id;
        }
        if !chunk.model.is_empty() {
            self.model = chunk.model;
        }
        if chunk.created != 0 {
            self.created = chunk.created;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        for choice in chunk.choices {
            let state = self.choices.entry(choice.index).or_default();
            if let Some(content) = choice.delta.content {
                state.content.push_str(&content);
                state.saw_content = true;
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                let entry = state.tool_calls.entry(call.index).or_default();
                if let Some(id) = call.id {
                    entry.id = Some(id);
                }
                if let Some(function) = call.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                state.finish_reason = Some(reason);
            }
        }
    }

    pub fn finalize(self) -> Option<ChatCompletion> {
        if self.chunks == 0 {
            return None;
        }
        let choices = self
            .choices
            .into_iter()
            .map(|(index, state)| {
                let tool_calls: Vec<MessageToolCall> = state
                    .tool_calls
                    .into_iter()
                    .map(|(call_index, call)| MessageToolCall {
                        id: call
                            .id
                            .unwrap_or_else(|| format!("call_{}_{call_index}", call.name)),
                        kind: ToolCallType::Function,
                        function: FunctionCall {
                            name: call.name,
                            arguments: call.arguments,
                        },
                    })
                    .collect();
                ChatCompletionChoice {
                    index,
                    message: ResponseMessage::assistant(
                        state.saw_content.then_some(state.content),
                        (!tool_calls.is_empty()).then_some(tool_calls),
                    ),
                    finish_reason: Some(state.finish_reason.unwrap_or(FinishReason::Stop)),
                    extra: Passthrough::new(),
                }
            })
            .collect();
        Some(ChatCompletion {
            id: self.id,
            object: ChatCompletionObjectType::ChatCompletion,
            created: self.created,
            model: self.model,
            choices,
            usage: self.usage,
            extra: Passthrough::new(),
        })
    }
}

/// Parses a whole event-stream body. Frames that are not chunks are ignored.
pub fn fold_event_stream(body: &[u8]) -> Option<ChatCompletion> {
    let text = String::from_utf8_lossy(body);
    let mut acc = ChunkAccumulator::new();
    SseFrames::new(&text)
        .take_while(|event| !event.is_done())
        .filter_map(|event| serde_json::from_str::<ChatCompletionChunk>(&event.data).ok())
        .for_each(|chunk| acc.push_chunk(chunk));
    acc.finalize()
}
