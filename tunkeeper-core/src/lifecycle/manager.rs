//! Connection lifecycle manager
//!
//! Owns at most one connecting worker and at most one established session.
//! Every transition of the two slots and of the disconnect-requested flag
//! happens inside a single critical section on [`Slots`]; status events are
//! queued inside the same section and delivered after it ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::outbox::{Notice, Outbox};
use super::reconnect::ReconnectPolicy;
use super::slots::{EstablishedSession, ManagerSnapshot, Slots, WorkerHandle, close_tunnel};
use crate::error::{ConfigError, WorkerError};
use crate::params::{ConnectionId, SessionParameters};
use crate::source::ParameterSource;
use crate::status::{LifecycleStatus, StatusSink, StatusUpdate};
use crate::worker::{TunnelHandle, WorkerFactory};

/// Reason attached to the final event when the reconnect policy gives up
pub const RECONNECT_EXHAUSTED: &str = "reconnect attempts exhausted";

/// Keeps a single tunnel session alive.
///
/// Cheap to clone; all clones drive the same session. When the last clone is
/// dropped the session is stopped and a final `Disconnected` is emitted.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    slots: Mutex<Slots>,
    outbox: Outbox,
    factory: Arc<dyn WorkerFactory>,
    runtime: Handle,
    next_connection_id: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager that spawns workers on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(
        factory: Arc<dyn WorkerFactory>,
        sink: Arc<dyn StatusSink>,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Self::with_runtime(Handle::current(), factory, sink, reconnect)
    }

    /// Create a manager that spawns workers on the given runtime
    pub fn with_runtime(
        runtime: Handle,
        factory: Arc<dyn WorkerFactory>,
        sink: Arc<dyn StatusSink>,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(Slots::new(reconnect)),
                outbox: Outbox::new(sink),
                factory,
                runtime,
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Start a fresh attempt, superseding any attempt still connecting.
    ///
    /// Clears the disconnect-requested flag and queues `Connecting` before the
    /// worker runs. Never blocks.
    ///
    /// The event is usually delivered before this returns. When another
    /// thread is already delivering events, that thread delivers it instead,
    /// after the events queued ahead of it.
    pub fn start(&self, params: SessionParameters) -> ConnectionId {
        self.shared.start(params)
    }

    /// Resolve parameters from `source` and start.
    ///
    /// A configuration error is reported to the status sink and returned; no
    /// worker is created and neither slot changes.
    pub fn start_from_source(
        &self,
        source: &dyn ParameterSource,
    ) -> Result<ConnectionId, ConfigError> {
        match source.resolve() {
            Ok(params) => Ok(self.start(params)),
            Err(e) => {
                self.shared.report_config_error(&e);
                Err(e)
            }
        }
    }

    /// Stop everything and suppress auto-reconnect until the next start.
    ///
    /// Interrupts the connecting worker, closes the established tunnel, emits
    /// `Disconnected` and releases the foreground indicator. Never waits for
    /// workers to exit.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Report a completed handshake on behalf of `from`.
    ///
    /// Returns whether the tunnel was installed. A worker that was superseded
    /// gets `false` and its tunnel is closed.
    pub fn on_established(&self, from: &WorkerHandle, tunnel: Box<dyn TunnelHandle>) -> bool {
        self.shared.on_established(from, tunnel)
    }

    /// Report that `from` failed or lost its tunnel.
    ///
    /// Reconnects with the last parameters unless a stop was requested.
    /// Reports from superseded workers are ignored.
    pub fn on_disconnected(&self, from: &WorkerHandle, reason: Option<String>) {
        self.shared.on_disconnected(from, reason);
    }

    /// Stop and emit the final `Disconnected`; for host shutdown paths
    pub fn shutdown(&self) {
        info!("Shutting down connection manager");
        self.shared.stop();
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        self.shared.lock_slots().snapshot()
    }

    /// Status derived from the current slots
    pub fn status(&self) -> LifecycleStatus {
        derive_status(&self.shared.lock_slots())
    }
}

fn derive_status(slots: &Slots) -> LifecycleStatus {
    if slots.established.is_some() {
        LifecycleStatus::Connected
    } else if slots.connecting.is_some() {
        LifecycleStatus::Connecting
    } else {
        LifecycleStatus::Disconnected
    }
}

impl Shared {
    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        // Every critical section leaves the slots consistent, so a panic
        // elsewhere does not invalidate them.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::SeqCst)
    }

    fn start(self: &Arc<Self>, params: SessionParameters) -> ConnectionId {
        let connection_id = {
            let mut slots = self.lock_slots();
            let connection_id = self.allocate_id();
            slots.disconnect_requested = false;
            slots.reconnect.reset();

            info!(
                connection_id,
                address = %params.address(),
                port = params.port(),
                "Starting connection"
            );
            self.outbox.status(StatusUpdate::new(
                LifecycleStatus::Connecting,
                Some(connection_id),
            ));
            self.launch(&mut slots, connection_id, params, Duration::ZERO);
            connection_id
        };
        self.outbox.flush();
        connection_id
    }

    /// Put a new worker in the connecting slot and spawn it. Caller holds the lock.
    fn launch(
        self: &Arc<Self>,
        slots: &mut Slots,
        connection_id: ConnectionId,
        params: SessionParameters,
        delay: Duration,
    ) {
        let handle = WorkerHandle::new(connection_id);
        slots.last_params = Some(params.clone());
        slots.replace_connecting(Some(handle.clone()));
        self.spawn_worker(handle, params, delay);
    }

    /// Spawn the supervising task for one worker.
    ///
    /// Whatever the worker ends with, including a panic, becomes a call to
    /// `on_disconnected` for its handle. Spawning never polls the task inline,
    /// so this is safe under the slots lock.
    fn spawn_worker(
        self: &Arc<Self>,
        handle: WorkerHandle,
        params: SessionParameters,
        delay: Duration,
    ) {
        let worker = self.factory.create(&params, handle.connection_id());
        let ctx = WorkerContext {
            handle: handle.clone(),
            params,
            manager: Arc::downgrade(self),
        };
        let manager = Arc::downgrade(self);
        let runtime = self.runtime.clone();

        self.runtime.spawn(async move {
            let connection_id = handle.connection_id();

            let outcome = if !delay.is_zero() && !wait_unless_interrupted(&handle, delay).await {
                Err(WorkerError::Interrupted)
            } else {
                match runtime.spawn(worker.run(ctx)).await {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => Err(WorkerError::Panicked(e.to_string())),
                    Err(_) => Err(WorkerError::Interrupted),
                }
            };

            let reason = match outcome {
                Ok(()) => "session ended".to_string(),
                Err(e) if e.is_interruption() => {
                    debug!(connection_id, "Worker interrupted");
                    e.to_string()
                }
                Err(e) => {
                    warn!(connection_id, error = %e, "Worker failed");
                    e.to_string()
                }
            };

            if let Some(shared) = manager.upgrade() {
                shared.on_disconnected(&handle, Some(reason));
            }
        });
    }

    fn on_established(&self, from: &WorkerHandle, mut tunnel: Box<dyn TunnelHandle>) -> bool {
        let connection_id = from.connection_id();

        let previous = {
            let mut slots = self.lock_slots();
            if !slots.is_connecting(from) {
                drop(slots);
                debug!(connection_id, "Superseded worker reported a tunnel; closing it");
                if let Err(e) = close_tunnel(tunnel.as_mut()) {
                    warn!(connection_id, error = %e, "Closing superseded tunnel");
                }
                return false;
            }

            slots.connecting = None;
            let previous = slots.replace_established(Some(EstablishedSession {
                worker: from.clone(),
                tunnel,
            }));
            slots.reconnect.reset();
            self.outbox.status(StatusUpdate::new(
                LifecycleStatus::Connected,
                Some(connection_id),
            ));
            previous
        };

        if let Some(previous) = previous {
            debug!(
                connection_id,
                previous = previous.connection_id(),
                "Replacing established session"
            );
            previous.teardown();
        }
        info!(connection_id, "Connected");
        self.outbox.flush();
        true
    }

    fn on_disconnected(self: &Arc<Self>, from: &WorkerHandle, reason: Option<String>) {
        let connection_id = from.connection_id();

        let dropped = {
            let mut slots = self.lock_slots();
            let dropped = if slots.is_connecting(from) {
                slots.connecting = None;
                None
            } else if slots.is_established(from) {
                slots.replace_established(None)
            } else {
                drop(slots);
                debug!(connection_id, "Ignoring disconnect from superseded worker");
                return;
            };

            let mut update = StatusUpdate::new(LifecycleStatus::Disconnected, Some(connection_id));
            if let Some(reason) = &reason {
                update = update.with_reason(reason.clone());
            }
            info!(connection_id, reason = reason.as_deref().unwrap_or(""), "Disconnected");
            self.outbox.status(update);

            if slots.disconnect_requested {
                debug!(connection_id, "Stop was requested; not reconnecting");
            } else if let Some(pending) = &slots.connecting {
                debug!(
                    connection_id,
                    pending = pending.connection_id(),
                    "Attempt already in flight; not reconnecting"
                );
            } else if let Some(params) = slots.last_params.clone() {
                match slots.reconnect.next_delay() {
                    Some(delay) => {
                        let next_id = self.allocate_id();
                        info!(
                            connection_id = next_id,
                            delay_ms = delay.as_millis() as u64,
                            recent_attempts = slots.reconnect.recent_attempts(),
                            "Reconnecting"
                        );
                        self.outbox
                            .status(StatusUpdate::new(LifecycleStatus::Connecting, Some(next_id)));
                        self.launch(&mut slots, next_id, params, delay);
                    }
                    None => {
                        warn!(
                            connection_id,
                            recent_attempts = slots.reconnect.recent_attempts(),
                            "Giving up on reconnecting"
                        );
                        self.outbox.status(
                            StatusUpdate::new(LifecycleStatus::Disconnected, Some(connection_id))
                                .with_reason(RECONNECT_EXHAUSTED),
                        );
                    }
                }
            }
            dropped
        };

        if let Some(session) = dropped {
            session.teardown();
        }
        self.outbox.flush();
    }

    fn stop(&self) {
        let established = {
            let mut slots = self.lock_slots();
            slots.disconnect_requested = true;

            let connection_id = slots
                .established
                .as_ref()
                .map(EstablishedSession::connection_id)
                .or(slots.connecting.as_ref().map(WorkerHandle::connection_id));

            slots.replace_connecting(None);
            let established = slots.replace_established(None);

            info!(connection_id, "Stopping connection");
            self.outbox
                .status(StatusUpdate::new(LifecycleStatus::Disconnected, connection_id));
            self.outbox.push(Notice::Release);
            established
        };

        if let Some(session) = established {
            session.teardown();
        }
        self.outbox.flush();
    }

    fn report_config_error(&self, error: &ConfigError) {
        warn!(error = %error, "Not starting: bad configuration");
        {
            let slots = self.lock_slots();
            let current = slots
                .established
                .as_ref()
                .map(EstablishedSession::connection_id)
                .or(slots.connecting.as_ref().map(WorkerHandle::connection_id));
            self.outbox
                .status(StatusUpdate::new(derive_status(&slots), current).with_reason(error.to_string()));
        }
        self.outbox.flush();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let already_stopped = {
            let slots = self.lock_slots();
            slots.disconnect_requested && slots.snapshot().is_idle()
        };
        if !already_stopped {
            self.stop();
        }
    }
}

/// Sleep for `delay` unless the worker is interrupted first.
/// Returns `true` when the full delay elapsed.
async fn wait_unless_interrupted(handle: &WorkerHandle, delay: Duration) -> bool {
    tokio::select! {
        _ = handle.interrupted() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// What a worker gets to talk back to the manager
pub struct WorkerContext {
    handle: WorkerHandle,
    params: SessionParameters,
    manager: Weak<Shared>,
}

impl WorkerContext {
    pub fn connection_id(&self) -> ConnectionId {
        self.handle.connection_id()
    }

    pub fn parameters(&self) -> &SessionParameters {
        &self.params
    }

    pub fn is_interrupted(&self) -> bool {
        self.handle.is_interrupted()
    }

    /// Resolves once the manager has interrupted this worker
    pub async fn interrupted(&self) {
        self.handle.interrupted().await
    }

    /// Hand the tunnel to the manager.
    ///
    /// Returns `false` when this worker has been superseded; the tunnel has
    /// then already been closed and the worker should exit.
    pub fn established(&self, mut tunnel: Box<dyn TunnelHandle>) -> bool {
        match self.manager.upgrade() {
            Some(shared) => shared.on_established(&self.handle, tunnel),
            None => {
                if let Err(e) = close_tunnel(tunnel.as_mut()) {
                    warn!(connection_id = self.connection_id(), error = %e, "Closing orphaned tunnel");
                }
                false
            }
        }
    }
}
