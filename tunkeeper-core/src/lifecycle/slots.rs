//! The state guarded by the manager lock

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::reconnect::ReconnectPolicy;
use crate::error::TeardownError;
use crate::params::{ConnectionId, SessionParameters};
use crate::worker::TunnelHandle;

/// Handle to one running worker.
///
/// Equality is identity: two handles are equal only if they were cloned from
/// the same original. The connection id is informational.
#[derive(Clone)]
pub struct WorkerHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    connection_id: ConnectionId,
    interrupt: CancellationToken,
}

impl WorkerHandle {
    pub(crate) fn new(connection_id: ConnectionId) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                connection_id,
                interrupt: CancellationToken::new(),
            }),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.inner.connection_id
    }

    /// Ask the worker to stop. Advisory; never waits.
    pub fn interrupt(&self) {
        self.inner.interrupt.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupt.is_cancelled()
    }

    /// Resolves once the worker has been interrupted
    pub async fn interrupted(&self) {
        self.inner.interrupt.cancelled().await
    }
}

impl PartialEq for WorkerHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for WorkerHandle {}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("connection_id", &self.inner.connection_id)
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// A live tunnel together with the worker that built it
pub struct EstablishedSession {
    pub(crate) worker: WorkerHandle,
    pub(crate) tunnel: Box<dyn TunnelHandle>,
}

impl EstablishedSession {
    pub fn connection_id(&self) -> ConnectionId {
        self.worker.connection_id()
    }

    /// Interrupt the worker and close the tunnel. Close failures are logged.
    pub(crate) fn teardown(mut self) {
        self.worker.interrupt();
        let connection_id = self.worker.connection_id();
        if let Err(e) = close_tunnel(self.tunnel.as_mut()) {
            warn!(connection_id, error = %e, "Closing VPN interface");
        } else {
            debug!(connection_id, "Tunnel closed");
        }
    }
}

pub(crate) fn close_tunnel(tunnel: &mut dyn TunnelHandle) -> Result<(), TeardownError> {
    tunnel.close().map_err(|source| TeardownError {
        tunnel: tunnel.describe(),
        source,
    })
}

/// Everything the manager lock protects
pub(crate) struct Slots {
    pub connecting: Option<WorkerHandle>,
    pub established: Option<EstablishedSession>,
    pub disconnect_requested: bool,
    pub last_params: Option<SessionParameters>,
    pub reconnect: ReconnectPolicy,
}

impl Slots {
    pub fn new(reconnect: ReconnectPolicy) -> Self {
        Self {
            connecting: None,
            established: None,
            disconnect_requested: false,
            last_params: None,
            reconnect,
        }
    }

    /// Install a new connecting worker, interrupting the one it replaces.
    pub fn replace_connecting(&mut self, handle: Option<WorkerHandle>) {
        if let Some(old) = std::mem::replace(&mut self.connecting, handle) {
            debug!(connection_id = old.connection_id(), "Superseding connecting worker");
            old.interrupt();
        }
    }

    /// Install a new established session. The previous one, already
    /// interrupted, is handed back for the caller to close once unlocked.
    pub fn replace_established(
        &mut self,
        session: Option<EstablishedSession>,
    ) -> Option<EstablishedSession> {
        let old = std::mem::replace(&mut self.established, session);
        if let Some(old) = &old {
            old.worker.interrupt();
        }
        old
    }

    pub fn is_connecting(&self, handle: &WorkerHandle) -> bool {
        self.connecting.as_ref() == Some(handle)
    }

    pub fn is_established(&self, handle: &WorkerHandle) -> bool {
        self.established.as_ref().map(|s| &s.worker) == Some(handle)
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            connecting: self.connecting.as_ref().map(WorkerHandle::connection_id),
            established: self.established.as_ref().map(EstablishedSession::connection_id),
            disconnect_requested: self.disconnect_requested,
        }
    }
}

/// Point-in-time view of the manager's slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManagerSnapshot {
    pub connecting: Option<ConnectionId>,
    pub established: Option<ConnectionId>,
    pub disconnect_requested: bool,
}

impl ManagerSnapshot {
    pub fn is_idle(&self) -> bool {
        self.connecting.is_none() && self.established.is_none()
    }
}
