//! Demo push backend for the clouddeck real-time layer: one `/ws` route,
//! per-socket topic subscriptions, and a broadcast hub behind them.

pub mod simulate;
pub mod state;
pub mod ws;

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::task::JoinHandle;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new().route("/ws", get(ws::ws_handler)).with_state(state)
}

/// Bind and serve in a background task. Returns the bound address, which
/// matters when binding port 0 from tests.
pub async fn spawn(state: AppState, addr: SocketAddr) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let app = router(state);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "agent server stopped");
        }
    });
    Ok((local, handle))
}

/// `--port N`, `-p N`, or `--port=N`; anything else keeps the default.
pub fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut value: Option<String> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "--port" | "-p" => value = it.next(),
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    value = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    value
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}
