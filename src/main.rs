use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use guildvoice::agent_bridge::{AgentBridge, AgentRuntime, DispatchContext};
use guildvoice::config::Config;
use guildvoice::engine::resolve_mode;
use guildvoice::error::Result;
use guildvoice::manager::SessionManager;
use guildvoice::rpc::{router, ServerState};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Placeholder runtime used when this crate is run standalone, outside a host
/// agent process. A real deployment wires `AgentBridge` to the host's own
/// buffered-block dispatcher instead (§4.9).
struct StandaloneRuntime;

#[async_trait]
impl AgentRuntime for StandaloneRuntime {
    async fn dispatch(&self, ctx: DispatchContext) -> Result<Vec<String>> {
        tracing::info!(session_key = %ctx.session_key, text = %ctx.text, "dispatching to standalone runtime");
        Ok(vec!["I'm not connected to a reasoning backend yet.".to_string()])
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("GUILDVOICE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load_or_default(&config_path);
    tracing::info!(path = %config_path, mode = ?resolve_mode(&config), "loaded configuration");

    let agent = Arc::new(AgentBridge::new(Arc::new(StandaloneRuntime)));
    let manager = Arc::new(SessionManager::new(agent));
    let state = ServerState::new(manager, &config);

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());
    let addr: SocketAddr = std::env::var("GUILDVOICE_LISTEN")
        .unwrap_or_else(|_| "0.0.0.0:8787".to_string())
        .parse()?;

    tracing::info!(%addr, "voice-gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
