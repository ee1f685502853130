use std::sync::Arc;

use anyhow::Context;

use alpinesight::api::{build_router, AppState};
use alpinesight::config::{self, AppConfig};
use alpinesight::inference::{CompletionProvider, InferenceClient};
use alpinesight::tools;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("cannot resolve working directory")?;
    let config_path = config::find_config_path(&cwd);
    let config: AppConfig = match &config_path {
        Some(path) => config::load_config(path)?,
        None => config::config_from_env()?,
    };

    alpinesight::init_tracing(&config.logging).context("failed to initialize logging")?;

    let client = InferenceClient::from_config(config.provider.clone())?;
    let base_url = client.base_url().to_string();
    let provider: Arc<dyn CompletionProvider> = Arc::new(client);

    // A duplicate tool name is a startup error, never a runtime one.
    let registry = tools::default_registry(&config.tools, &config.orchestrator)
        .context("failed to build tool registry")?;
    let registry = Arc::new(registry);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<environment>".to_string()),
        bind = %config.server.bind,
        base_url = %base_url,
        model = %config.provider.model,
        tool_count = registry.len(),
        max_rounds = config.orchestrator.max_rounds,
        pid = std::process::id(),
        "=== AlpineSight starting ==="
    );

    let state = AppState::new(provider, registry, &config.orchestrator);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(addr = %config.server.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
