use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use crate::handler::{proxy_handler, search_handler};
use crate::state::AppState;

pub struct Core {
    state: Arc<AppState>,
}

impl Core {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/search", get(search_handler))
            .fallback(proxy_handler)
            .with_state(self.state.clone())
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }
}
