pub mod config;
pub mod route;
pub mod rules;

pub use config::{ConfigError, ConfigPatch, ProxyConfig, UpstreamPolicy};
pub use route::{
    BackendRoute, DirectRouteConfig, Endpoint, ModelAlias, RouteDecision, RouteKind,
    RoutePriority, RoutingTable, Scheme,
};
pub use rules::{
    CommandRuleConfig, DirectiveConfig, QuoteStyle, RuleHint, SearchConfig, SentinelConfig,
    ToolPromptConfig, UtteranceFilterConfig, default_utterance_filters,
};
