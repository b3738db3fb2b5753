//! Session worker boundary
//!
//! A worker performs the tunnel handshake for one start attempt. The manager
//! only sees it through these traits: it never knows how the tunnel is built.

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::lifecycle::WorkerContext;
use crate::params::{ConnectionId, SessionParameters};

/// An open tunnel resource.
///
/// Exactly one holder owns a tunnel handle at a time. Once the manager
/// installs it as the established session, the manager is the one that closes it.
pub trait TunnelHandle: Send {
    /// Release the underlying resource
    fn close(&mut self) -> std::io::Result<()>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// One connection attempt
///
/// `run` performs the handshake, hands the tunnel to the manager through
/// [`WorkerContext::established`], and keeps running until the tunnel drops
/// or the context is interrupted. Whatever it returns, including a panic, is
/// reported to the manager as a disconnect.
#[async_trait]
pub trait SessionWorker: Send {
    async fn run(self: Box<Self>, ctx: WorkerContext) -> Result<(), WorkerError>;
}

/// Factory for creating session workers
///
/// Enables dependency injection of worker implementations.
pub trait WorkerFactory: Send + Sync {
    fn create(
        &self,
        params: &SessionParameters,
        connection_id: ConnectionId,
    ) -> Box<dyn SessionWorker>;
}
