pub mod bootstrap;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handler;
pub mod pipeline;
pub mod search;
pub mod state;
pub mod upstream;

pub use bootstrap::{Bootstrap, CliArgs, bootstrap, bootstrap_from_env};
pub use core::Core;
pub use dispatch::{DispatchError, Dispatcher, UpstreamReply};
pub use error::ProxyError;
pub use events::{DirectiveSkip, Event, EventHub, EventKind, EventSink, TerminalEventSink, TracingEventSink};
pub use handler::REQUEST_ID_HEADER;
pub use pipeline::{Pipeline, Reply};
pub use search::{HttpSearchProvider, SearchError, SearchProvider};
pub use state::AppState;
pub use upstream::{
    HttpMethod, TransportErrorKind, UpstreamClient, UpstreamClientConfig, UpstreamFailure,
    UpstreamHttpRequest, UpstreamHttpResponse, WreqUpstreamClient,
};
