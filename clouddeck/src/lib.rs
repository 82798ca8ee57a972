//! Real-time dashboard update distribution over one shared WebSocket.
//!
//! One [`RealtimeService`] holds the connection and the topic registry;
//! screens hold adapters. An adapter subscribes its topic on creation,
//! applies the topic's bounded merge rule to its own local view on every
//! push, and unsubscribes exactly its own listener when dropped. The
//! transport hears about each topic once, no matter how many adapters
//! listen, and the active topic set is replayed after every reconnect.

pub mod adapter;
pub mod conn;
pub mod error;
pub mod profiles;
pub mod registry;
pub mod store;
pub mod types;
pub mod wire;

pub use adapter::{
    AdapterPhase, AlertsAdapter, DeploymentsAdapter, LogsAdapter, MetricsAdapter,
    RealtimeService, SystemStatusAdapter,
};
pub use conn::{ClientConfig, ConnState, ConnectionManager, ListenerToken, ReconnectPolicy};
pub use error::RealtimeError;
pub use registry::{ChannelRegistry, SubscriptionHandle};
pub use wire::{Frame, Topic};
