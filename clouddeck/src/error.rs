//! Error taxonomy for the realtime layer.
//!
//! Connectivity problems are not represented here: they surface to
//! consumers as state (`socket_error` events, `is_connected() == false`)
//! rather than as returned errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The backend URL failed to parse or is not a ws/wss endpoint.
    #[error("invalid backend url `{0}` (expected ws:// or wss://)")]
    InvalidUrl(String),

    /// A frame could not be encoded or decoded as JSON.
    #[error("frame codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
