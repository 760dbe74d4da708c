//! Pure request/response stages of the proxy. Nothing here performs I/O or
//! logs; callers turn the returned outcomes into events.

pub mod directive;
pub mod error;
pub mod extract;
pub mod fold;
pub mod history;
pub mod normalize;
pub mod prompt;
pub mod registry;
pub mod rewrite;
pub mod search;
pub mod sentinel;
pub mod synthesize;
pub mod utterance;

pub use directive::{CommandRule, DirectiveInterceptor, DirectiveOutcome};
pub use error::TransformError;
pub use extract::{ExtractStrategy, Extraction, ToolCallExtractor};
pub use fold::{ChunkAccumulator, fold_event_stream};
pub use history::trim_history;
pub use normalize::{NormalizedRequest, Normalizer, parse_request};
pub use prompt::{ToolPrompt, append_to_first_instruction, inject_instruction};
pub use registry::{RegisteredTool, ToolRegistry};
pub use rewrite::ModelNameRewriter;
pub use search::{SearchHeuristic, SearchHit, inject_results, last_user_text, render_results};
pub use sentinel::SentinelPolicy;
pub use synthesize::{FinalResponse, StreamEvent};
pub use utterance::{Utterance, UtteranceFilter, UtteranceLocator, UtterancePredicate};
