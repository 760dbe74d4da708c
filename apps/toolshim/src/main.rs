use std::error::Error;

use toolshim_core::{Core, bootstrap_from_env};
use tracing::info;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("toolshim failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let boot = bootstrap_from_env().await?;
    let config = &boot.config;
    info!(
        host = %config.host,
        port = config.port,
        upstream = %config.upstream_url,
        default_model = %config.default_model,
        aliases = config.aliases.len(),
        direct_routes = config.direct_routes.len(),
        rules = config.directives.rules.len(),
        search = boot.state.pipeline.has_search(),
        "config loaded"
    );

    let bind = boot.bind_addr();
    let app = Core::new(boot.state.clone()).router();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shut down");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("toolshim=info,toolshim_core=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
