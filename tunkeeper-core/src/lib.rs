//! tunkeeper-core: Connection lifecycle core for a single VPN tunnel
//!
//! This crate keeps at most one tunnel session alive:
//!
//! - **Lifecycle** - [`ConnectionManager`] owns the connecting worker and the established session
//! - **Workers** - [`SessionWorker`] and [`WorkerFactory`] are the boundary to whatever builds the tunnel
//! - **Status** - [`StatusUpdate`] events delivered in order to a [`StatusSink`]
//! - **Parameters** - [`SessionParameters`] resolved from a [`ParameterSource`] such as a [`ServerDirectory`] entry
//! - **Reconnect** - [`ReconnectPolicy`] decides whether and when a dropped session comes back
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tunkeeper_core::{
//!     BroadcastSink, ConnectionManager, ReconnectPolicy, SessionParameters, TcpWorkerFactory,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(BroadcastSink::default());
//! let mut updates = sink.subscribe();
//! let manager = ConnectionManager::new(
//!     Arc::new(TcpWorkerFactory::default()),
//!     sink,
//!     ReconnectPolicy::immediate(),
//! );
//!
//! manager.start(SessionParameters::parse("203.0.113.7", "8000", "secret")?);
//! while let Ok(update) = updates.recv().await {
//!     println!("{}", update.display_text());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              ConnectionManager               │
//! │  ┌──────────────────┐  ┌──────────────────┐  │
//! │  │ connecting slot  │  │ established slot │  │
//! │  │  (WorkerHandle)  │  │ (handle, tunnel) │  │
//! │  └──────────────────┘  └──────────────────┘  │
//! │        one lock ── outbox ──> StatusSink     │
//! └──────────────────────────────────────────────┘
//!          │ spawn                ▲ on_established / on_disconnected
//!          ▼                      │
//!     SessionWorker ──────────────┘
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod intent;
pub mod lifecycle;
pub mod params;
pub mod source;
pub mod status;
pub mod testing;
pub mod worker;

// Re-export key types for convenience
pub use config::{DirectoryConfig, FallbackServer, ReconnectConfig, ReconnectMode};
pub use directory::{ServerDirectory, ServerEntry};
pub use error::{ConfigError, TeardownError, WorkerError};
pub use intent::{Intent, Stickiness, dispatch};
pub use lifecycle::{
    ConnectionManager, EstablishedSession, ManagerSnapshot, ReconnectPolicy, WorkerContext,
    WorkerHandle,
};
pub use params::{ConnectionId, SessionParameters};
pub use source::{ParameterSource, SelectionOrFallback};
pub use status::{BroadcastSink, FanoutSink, LifecycleStatus, RecordingSink, StatusSink, StatusUpdate};
pub use worker::{SessionWorker, TcpWorkerFactory, TunnelHandle, WorkerFactory};
