use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use craftmind::events::EventLog;
use craftmind::game::GameCommander;
use craftmind::reactor::EventReactor;
use craftmind::{http, AppState, ServerConfig};

#[tokio::main]
async fn main() -> craftmind::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("craftmind=debug")),
        )
        .init();

    let config = ServerConfig::load()?;
    config.ensure_data_dir()?;

    let state = AppState::new(config);

    // Warm the bridge up front so the first /mcp/call doesn't pay the spawn
    // cost. Failure is fine; calls retry lazily.
    if state.bridge.available() {
        state.bridge.ensure_started(false).await;
    } else {
        tracing::warn!("MCP server script not found; bridge will report errors until it appears");
    }

    spawn_reactor(&state);

    let listener = TcpListener::bind(&state.config.bind_addr).await?;
    tracing::info!("Listening on {}", state.config.bind_addr);

    let bridge = state.bridge.clone();
    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bridge.stop().await;
    Ok(())
}

fn spawn_reactor(state: &AppState) {
    let npcs = state.npcs.clone();
    let mut reactor = EventReactor::new(
        EventLog::new(state.config.events_path()),
        GameCommander::new(&state.config.game_bridge_url),
    );
    let interval = Duration::from_secs(state.config.reactor_interval_secs);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let npcs = npcs.read().await;
            reactor.tick(&npcs).await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
