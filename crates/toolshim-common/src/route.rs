use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(ConfigError::InvalidUrl {
                    url: raw.to_string(),
                    reason: format!("unsupported scheme {other}"),
                });
            }
        };
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ConfigError::InvalidUrl {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        });
        Ok(Self { scheme, host, port })
    }

    pub fn url_for(&self, path: &str) -> String {
        let sep = if path.starts_with('/') { "" } else { "/" };
        format!(
            "{}://{}:{}{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            sep,
            path
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// The primary backend behind the generic completion endpoint.
    Local,
    /// A different provider reached through its own endpoint and model id.
    Direct,
}

/// Immutable routing entry, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRoute {
    pub name: String,
    pub kind: RouteKind,
    pub endpoint: Endpoint,
    /// Fixed endpoint path. `None` forwards the inbound request path.
    pub path: Option<String>,
    pub credential: Option<String>,
    pub backend_model: Option<String>,
    pub strip_params: Vec<String>,
    pub headers: Vec<(String, String)>,
}

impl BackendRoute {
    pub fn url(&self, inbound_path: &str) -> String {
        self.endpoint
            .url_for(self.path.as_deref().unwrap_or(inbound_path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAlias {
    /// Client-facing id.
    pub client: String,
    /// Backend id substituted on the local route.
    pub backend: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectRouteConfig {
    pub client_model: String,
    pub url: String,
    pub backend_model: String,
    #[serde(default = "default_direct_path")]
    pub path: String,
    #[serde(default)]
    pub credential: Option<String>,
    /// Environment variable holding the credential; read at startup.
    #[serde(default)]
    pub credential_env: Option<String>,
    #[serde(default = "default_direct_strip")]
    pub strip_params: Vec<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_direct_path() -> String {
    "/api/v1/chat/completions".to_string()
}

fn default_direct_strip() -> Vec<String> {
    ["store", "metadata", "service_tier"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Which table wins when a client id is both an alias and a direct route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePriority {
    #[default]
    DirectFirst,
    AliasFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision<'a> {
    Local {
        /// Substituted backend id; `None` keeps the client id.
        backend_model: Option<&'a str>,
    },
    Direct(&'a BackendRoute),
}

#[derive(Debug, Clone)]
pub struct RoutingTable {
    pub local: BackendRoute,
    pub direct: Vec<BackendRoute>,
    pub aliases: Vec<ModelAlias>,
    pub priority: RoutePriority,
    /// Client ids in the order they win reverse-mapping collisions.
    pub reverse_priority: Vec<String>,
}

impl RoutingTable {
    pub fn resolve(&self, client_model: &str) -> RouteDecision<'_> {
        let direct = || self.direct.iter().find(|route| route.name == client_model);
        let alias = || {
            self.aliases
                .iter()
                .find(|alias| alias.client == client_model)
                .map(|alias| alias.backend.as_str())
        };
        match self.priority {
            RoutePriority::DirectFirst => match direct() {
                Some(route) => RouteDecision::Direct(route),
                None => RouteDecision::Local {
                    backend_model: alias(),
                },
            },
            RoutePriority::AliasFirst => match (alias(), direct()) {
                (Some(backend), _) => RouteDecision::Local {
                    backend_model: Some(backend),
                },
                (None, Some(route)) => RouteDecision::Direct(route),
                (None, None) => RouteDecision::Local {
                    backend_model: None,
                },
            },
        }
    }

    /// Every known (backend id, client id) pair, one client per backend id.
    /// When several client ids share a backend id, the one listed earliest in
    /// `reverse_priority` wins; unlisted ids fall back to declaration order.
    pub fn reverse_pairs(&self) -> Vec<(String, String)> {
        let mut candidates: Vec<(String, String)> = self
            .aliases
            .iter()
            .map(|alias| (alias.backend.clone(), alias.client.clone()))
            .collect();
        for route in &self.direct {
            if let Some(backend) = route.backend_model.as_ref() {
                candidates.push((backend.clone(), route.name.clone()));
            }
        }

        let rank = |client: &str| {
            self.reverse_priority
                .iter()
                .position(|item| item == client)
                .unwrap_or(usize::MAX)
        };

        let mut out: Vec<(String, String)> = Vec::new();
        for (backend, client) in candidates {
            match out.iter_mut().find(|(known, _)| *known == backend) {
                Some(existing) => {
                    if rank(&client) < rank(&existing.1) {
                        existing.1 = client;
                    }
                }
                None => out.push((backend, client)),
            }
        }
        out
    }
}
