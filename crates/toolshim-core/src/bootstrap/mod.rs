use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use toolshim_common::{ConfigPatch, ProxyConfig};

use crate::events::{EventHub, EventSink, TerminalEventSink, TracingEventSink};
use crate::search::{HttpSearchProvider, SearchProvider};
use crate::state::AppState;
use crate::upstream::{UpstreamClient, UpstreamClientConfig, WreqUpstreamClient};

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "toolshim",
    version,
    about = "Chat-completion proxy that gives text-only backends tool calling"
)]
pub struct CliArgs {
    /// TOML file with routes, aliases and command rules.
    #[arg(long, env = "TOOLSHIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind host.
    #[arg(long, env = "TOOLSHIM_HOST")]
    pub host: Option<String>,

    /// Bind port.
    #[arg(long, env = "TOOLSHIM_PORT")]
    pub port: Option<String>,

    /// Local backend base URL.
    #[arg(long, env = "TOOLSHIM_UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    /// Bearer credential for the local backend.
    #[arg(long, env = "TOOLSHIM_API_KEY")]
    pub api_key: Option<String>,

    /// Client model id assumed for unparseable requests.
    #[arg(long, env = "TOOLSHIM_DEFAULT_MODEL")]
    pub default_model: Option<String>,

    /// Conversation turns kept per request.
    #[arg(long, env = "TOOLSHIM_HISTORY_WINDOW")]
    pub history_window: Option<String>,

    /// Upstream request timeout in seconds.
    #[arg(long, env = "TOOLSHIM_UPSTREAM_TIMEOUT")]
    pub upstream_timeout: Option<String>,

    /// Web-search endpoint (SearXNG-style JSON API).
    #[arg(long, env = "TOOLSHIM_SEARCH_ENDPOINT")]
    pub search_endpoint: Option<String>,

    /// Print every event as a JSON line on stderr.
    #[arg(long, env = "TOOLSHIM_TERMINAL_EVENTS")]
    pub terminal_events: Option<String>,
}

pub struct Bootstrap {
    pub config: Arc<ProxyConfig>,
    pub state: Arc<AppState>,
}

impl Bootstrap {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

pub async fn bootstrap_from_env() -> anyhow::Result<Bootstrap> {
    let args = CliArgs::parse();
    bootstrap(args).await
}

pub async fn bootstrap(args: CliArgs) -> anyhow::Result<Bootstrap> {
    let patch = cli_patch(&args)?;
    let config = ProxyConfig::load(args.config.as_deref(), patch).context("load config")?;
    let config = Arc::new(config);

    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingEventSink::new())];
    if config.terminal_events {
        sinks.push(Arc::new(TerminalEventSink::new()));
    }
    let events = EventHub::with_sinks(1024, sinks);

    let client: Arc<dyn UpstreamClient> = Arc::new(
        WreqUpstreamClient::new(UpstreamClientConfig::from_policy(&config.upstream))
            .context("build upstream client")?,
    );

    let search = match config.search.endpoint.as_deref() {
        Some(endpoint) => {
            let timeout = Duration::from_secs(config.search.timeout_secs.max(1));
            let search_client: Arc<dyn UpstreamClient> = Arc::new(
                WreqUpstreamClient::new(UpstreamClientConfig {
                    connect_timeout: timeout,
                    request_timeout: timeout,
                })
                .context("build search client")?,
            );
            let provider = HttpSearchProvider::new(endpoint, search_client, timeout)
                .context("configure search provider")?;
            Some(Arc::new(provider) as Arc<dyn SearchProvider>)
        }
        None => None,
    };

    let state = AppState::from_config(config.clone(), client, search, events)
        .context("build app state")?;

    Ok(Bootstrap {
        config,
        state: Arc::new(state),
    })
}

fn cli_patch(args: &CliArgs) -> anyhow::Result<ConfigPatch> {
    Ok(ConfigPatch {
        host: sanitize_optional_env_value(args.host.clone()),
        port: parse_env_value(args.port.clone(), "TOOLSHIM_PORT")?,
        default_model: sanitize_optional_env_value(args.default_model.clone()),
        upstream_url: sanitize_optional_env_value(args.upstream_url.clone()),
        api_key: sanitize_optional_env_value(args.api_key.clone()),
        history_window: parse_env_value(args.history_window.clone(), "TOOLSHIM_HISTORY_WINDOW")?,
        upstream_timeout_secs: parse_env_value(
            args.upstream_timeout.clone(),
            "TOOLSHIM_UPSTREAM_TIMEOUT",
        )?,
        search_endpoint: sanitize_optional_env_value(args.search_endpoint.clone()),
        terminal_events: parse_bool_env_value(
            args.terminal_events.clone(),
            "TOOLSHIM_TERMINAL_EVENTS",
        )?,
    })
}

fn sanitize_optional_env_value(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    // Unresolved `${VAR}` placeholders count as unset.
    if trimmed.starts_with("${") && trimmed.ends_with('}') {
        return None;
    }
    Some(trimmed)
}

fn parse_env_value<T>(value: Option<String>, env_name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
{
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}

fn parse_bool_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<bool>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => return Err(anyhow::anyhow!("invalid {env_name} value: {raw}")),
    };
    Ok(Some(parsed))
}
