//! WebSocket upgrade and per-connection push loop. Each socket keeps its
//! own subscribed topic set and only sees envelopes for those topics.

use std::collections::HashSet;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::stream::StreamExt;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use crate::state::{AppState, Envelope};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut feed = state.feed();
    let mut kicked = state.kick_feed();
    let mut topics: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            msg = socket.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Envelope>(&text) {
                        Ok(env) => handle_command(&state, &mut topics, env),
                        Err(e) => tracing::debug!(error = %e, "ignoring malformed frame"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
            ev = feed.recv() => match ev {
                Ok(env) if topics.contains(&env.event) => {
                    let text = match serde_json::to_string(&env) {
                        Ok(t) => t,
                        Err(_) => continue,
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "socket lagged behind the hub");
                }
                Err(RecvError::Closed) => break,
            },
            _ = kicked.recv() => break,
        }
    }
}

fn handle_command(state: &AppState, topics: &mut HashSet<String>, env: Envelope) {
    match env.event.as_str() {
        "subscribe" => {
            if let Some(topic) = env.payload.get("topic").and_then(Value::as_str) {
                // Duplicate subscribes from one socket are not re-counted.
                if topics.insert(topic.to_string()) {
                    state.record_subscribe(topic);
                    tracing::debug!(topic, "subscribed");
                }
            }
        }
        "unsubscribe" => {
            if let Some(topic) = env.payload.get("topic").and_then(Value::as_str) {
                if topics.remove(topic) {
                    state.record_unsubscribe(topic);
                    tracing::debug!(topic, "unsubscribed");
                }
            }
        }
        "acknowledge_alert" => {
            if let Some(alert_id) = env.payload.get("alertId").and_then(Value::as_str) {
                state.record_ack(alert_id);
                tracing::debug!(alert_id, "alert acknowledged");
            }
        }
        other => tracing::debug!(event = other, "ignoring unknown command"),
    }
}
