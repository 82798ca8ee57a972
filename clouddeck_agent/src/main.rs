//! Demo agent entry point: serves /ws and simulates dashboard pushes.

use std::net::SocketAddr;
use std::time::Duration;

use clouddeck_agent::{parse_port, simulate::spawn_simulator, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port = parse_port(std::env::args(), 4400);
    let state = AppState::new();
    spawn_simulator(state.clone(), Duration::from_secs(1));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let (local, handle) = clouddeck_agent::spawn(state, addr).await?;
    tracing::info!(addr = %local, "clouddeck agent listening");
    handle.await?;
    Ok(())
}
