use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::route::{
    BackendRoute, DirectRouteConfig, Endpoint, ModelAlias, RouteKind, RoutePriority, RoutingTable,
};
use crate::rules::{DirectiveConfig, SearchConfig, SentinelConfig, ToolPromptConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid config field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamPolicy {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Extra attempts after a transport failure. Zero disables retrying.
    pub retries: u32,
}

impl Default for UpstreamPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            connect_timeout_secs: 10,
            retries: 0,
        }
    }
}

/// Final, merged configuration used by the running process.
///
/// Merge order: CLI > ENV > config file > built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// Client model id assumed when the inbound body cannot be parsed.
    pub default_model: String,
    pub upstream_url: String,
    pub api_key: Option<String>,
    pub aliases: Vec<ModelAlias>,
    pub reverse_priority: Vec<String>,
    pub direct_routes: Vec<DirectRouteConfig>,
    pub route_priority: RoutePriority,
    pub unsupported_params: Vec<String>,
    pub history_window: usize,
    pub stream_chunk_size: usize,
    pub upstream: UpstreamPolicy,
    pub tools: ToolPromptConfig,
    pub directives: DirectiveConfig,
    pub sentinel: SentinelConfig,
    /// Appended to the first system turn on direct routes.
    pub direct_instruction: String,
    pub search: SearchConfig,
    /// Also print every event as a JSON line on stderr.
    pub terminal_events: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8443,
            default_model: "gpt-5.2".to_string(),
            upstream_url: "http://127.0.0.1:11434".to_string(),
            api_key: None,
            aliases: Vec::new(),
            reverse_priority: Vec::new(),
            direct_routes: Vec::new(),
            route_priority: RoutePriority::default(),
            unsupported_params: [
                "thinking",
                "reasoning_effort",
                "store",
                "metadata",
                "service_tier",
                "parallel_tool_calls",
                "stream_options",
                "tools",
                "tool_choice",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            history_window: 4,
            stream_chunk_size: 100,
            upstream: UpstreamPolicy::default(),
            tools: ToolPromptConfig::default(),
            directives: DirectiveConfig::default(),
            sentinel: SentinelConfig::default(),
            direct_instruction: "\n\nCRITICAL INSTRUCTION: You are chatting with a real user. \
                You MUST respond with helpful, natural, conversational text. NEVER output system \
                commands like HEARTBEAT_OK, NO_REPLY, session_status, or tool names as your \
                response. NEVER output just an emoji and a tool name. If the user says hello, \
                greet them back warmly. If the user asks a question, answer it."
                .to_string(),
            search: SearchConfig::default(),
            terminal_events: false,
        }
    }
}

impl ProxyConfig {
    /// Reads the optional TOML file, applies the CLI/ENV patch on top and
    /// validates the result.
    pub fn load(path: Option<&Path>, patch: ConfigPatch) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        patch.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_window == 0 {
            return Err(ConfigError::Invalid {
                field: "history_window",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.stream_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "stream_chunk_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "upstream.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.tools.execution_tool.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "tools.execution_tool",
                reason: "must not be empty".to_string(),
            });
        }
        Endpoint::parse(&self.upstream_url)?;
        for route in &self.direct_routes {
            Endpoint::parse(&route.url)?;
        }
        Ok(())
    }

    /// Builds the routing table, resolving `credential_env` from the process
    /// environment.
    pub fn routing_table(&self) -> Result<RoutingTable, ConfigError> {
        self.routing_table_with(|name| std::env::var(name).ok())
    }

    pub fn routing_table_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<RoutingTable, ConfigError> {
        let local = BackendRoute {
            name: "local".to_string(),
            kind: RouteKind::Local,
            endpoint: Endpoint::parse(&self.upstream_url)?,
            path: None,
            credential: self.api_key.clone().filter(|key| !key.is_empty()),
            backend_model: None,
            strip_params: self.unsupported_params.clone(),
            headers: Vec::new(),
        };

        let mut direct = Vec::with_capacity(self.direct_routes.len());
        for route in &self.direct_routes {
            let credential = route
                .credential
                .clone()
                .or_else(|| route.credential_env.as_deref().and_then(&lookup))
                .filter(|value| !value.is_empty());
            direct.push(BackendRoute {
                name: route.client_model.clone(),
                kind: RouteKind::Direct,
                endpoint: Endpoint::parse(&route.url)?,
                path: Some(route.path.clone()),
                credential,
                backend_model: Some(route.backend_model.clone()),
                strip_params: route.strip_params.clone(),
                headers: route
                    .headers
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
            });
        }

        Ok(RoutingTable {
            local,
            direct,
            aliases: self.aliases.clone(),
            priority: self.route_priority,
            reverse_priority: self.reverse_priority.clone(),
        })
    }
}

/// CLI/ENV values layered over the file. clap resolves CLI over ENV per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub default_model: Option<String>,
    pub upstream_url: Option<String>,
    pub api_key: Option<String>,
    pub history_window: Option<usize>,
    pub upstream_timeout_secs: Option<u64>,
    pub search_endpoint: Option<String>,
    pub terminal_events: Option<bool>,
}

impl ConfigPatch {
    pub fn apply(self, config: &mut ProxyConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(model) = self.default_model {
            config.default_model = model;
        }
        if let Some(url) = self.upstream_url {
            config.upstream_url = url;
        }
        if let Some(key) = self.api_key {
            config.api_key = Some(key);
        }
        if let Some(window) = self.history_window {
            config.history_window = window;
        }
        if let Some(timeout) = self.upstream_timeout_secs {
            config.upstream.timeout_secs = timeout;
        }
        if let Some(endpoint) = self.search_endpoint {
            config.search.endpoint = Some(endpoint).filter(|value| !value.is_empty());
        }
        if let Some(enabled) = self.terminal_events {
            config.terminal_events = enabled;
        }
    }
}

#[cfg(test)]
mod tests;
