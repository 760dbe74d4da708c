use std::sync::Arc;

use anyhow::Context;
use toolshim_common::ProxyConfig;

use crate::events::EventHub;
use crate::pipeline::Pipeline;
use crate::search::SearchProvider;
use crate::upstream::UpstreamClient;

/// Read-only state shared by every request.
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn from_config(
        config: Arc<ProxyConfig>,
        client: Arc<dyn UpstreamClient>,
        search: Option<Arc<dyn SearchProvider>>,
        events: EventHub,
    ) -> anyhow::Result<Self> {
        let routes = config.routing_table().context("build routing table")?;
        let pipeline = Pipeline::new(&config, routes, client, search, events)
            .context("compile request pipeline")?;
        Ok(Self { config, pipeline })
    }

    pub fn events(&self) -> &EventHub {
        self.pipeline.events()
    }
}
