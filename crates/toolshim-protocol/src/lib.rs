pub mod chat;
pub mod sse;

pub use chat::request::{ChatRequest, Message};
pub use chat::response::{
    ChatCompletion, ChatCompletionChoice, ChatCompletionObjectType, ResponseMessage,
};
pub use chat::stream::{
    ChatCompletionChunk, ChatCompletionChunkObjectType, ChunkChoice, ChunkDelta, ToolCallChunk,
    ToolCallChunkFunction,
};
pub use chat::types::{
    ContentPart, FinishReason, FunctionCall, FunctionObject, MessageContent, MessageToolCall,
    Passthrough, Role, ToolCallType, ToolDefinition, Usage,
};
