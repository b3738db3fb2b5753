//! Scriptable workers and tunnels for testing
//!
//! `ScriptedWorkerFactory` hands out workers that follow a queued [`Script`],
//! so manager behaviour can be driven deterministically without a network.
//! Tunnels are [`MockTunnel`]s whose [`TunnelProbe`] lets a test observe
//! whether the manager closed them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::WorkerError;
use crate::lifecycle::WorkerContext;
use crate::params::{ConnectionId, SessionParameters};
use crate::worker::{SessionWorker, TunnelHandle, WorkerFactory};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct TunnelState {
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

/// In-memory tunnel that records close calls
pub struct MockTunnel {
    name: String,
    state: Arc<TunnelState>,
    fail_close: bool,
}

/// Observer half of a [`MockTunnel`]
#[derive(Debug, Clone)]
pub struct TunnelProbe {
    state: Arc<TunnelState>,
}

impl MockTunnel {
    pub fn new(name: &str) -> (Self, TunnelProbe) {
        Self::build(name, false)
    }

    /// A tunnel whose `close` always fails
    pub fn failing(name: &str) -> (Self, TunnelProbe) {
        Self::build(name, true)
    }

    fn build(name: &str, fail_close: bool) -> (Self, TunnelProbe) {
        let state = Arc::new(TunnelState::default());
        let tunnel = Self {
            name: name.to_string(),
            state: state.clone(),
            fail_close,
        };
        (tunnel, TunnelProbe { state })
    }
}

impl TunnelHandle for MockTunnel {
    fn close(&mut self) -> std::io::Result<()> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(std::io::Error::other("mock close failure"));
        }
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("mock {}", self.name)
    }
}

impl TunnelProbe {
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }
}

/// What a scripted worker does when run
#[derive(Debug, Clone)]
pub enum Script {
    /// Establish a tunnel, then hold it until interrupted
    Succeed,
    /// Establish a tunnel, then report it dropped after the given time
    SucceedThenDrop(Duration),
    /// Fail the handshake with this message
    Fail(String),
    /// Never finish the handshake; exits only when interrupted
    Hang,
    /// Panic inside the worker
    Panic,
    /// Wait for the gate, ignoring interruption, then behave like `Succeed`
    Gated(Arc<Notify>),
}

/// One call to [`WorkerFactory::create`]
#[derive(Debug, Clone)]
pub struct Attempt {
    pub connection_id: ConnectionId,
    pub params: SessionParameters,
}

/// Factory whose workers follow queued scripts, falling back to a default
pub struct ScriptedWorkerFactory {
    scripts: Mutex<VecDeque<Script>>,
    default_script: Script,
    attempts: Mutex<Vec<Attempt>>,
    tunnels: Arc<Mutex<HashMap<ConnectionId, TunnelProbe>>>,
    active: Arc<Mutex<HashSet<ConnectionId>>>,
}

impl ScriptedWorkerFactory {
    pub fn new(default_script: Script) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            default_script,
            attempts: Mutex::new(Vec::new()),
            tunnels: Arc::new(Mutex::new(HashMap::new())),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Queue a script for the next created worker
    pub fn push(&self, script: Script) -> &Self {
        lock(&self.scripts).push_back(script);
        self
    }

    /// Number of workers created so far
    pub fn created(&self) -> usize {
        lock(&self.attempts).len()
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        lock(&self.attempts).clone()
    }

    /// Probe for the tunnel the worker for `connection_id` established
    pub fn tunnel(&self, connection_id: ConnectionId) -> Option<TunnelProbe> {
        lock(&self.tunnels).get(&connection_id).cloned()
    }

    /// Connection ids of workers that have been created and not yet finished
    pub fn active_workers(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = lock(&self.active).iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl WorkerFactory for ScriptedWorkerFactory {
    fn create(
        &self,
        params: &SessionParameters,
        connection_id: ConnectionId,
    ) -> Box<dyn SessionWorker> {
        let script = lock(&self.scripts)
            .pop_front()
            .unwrap_or_else(|| self.default_script.clone());
        lock(&self.attempts).push(Attempt {
            connection_id,
            params: params.clone(),
        });
        lock(&self.active).insert(connection_id);

        Box::new(ScriptedWorker {
            script,
            tunnels: self.tunnels.clone(),
            _active: ActiveGuard {
                connection_id,
                active: self.active.clone(),
            },
        })
    }
}

/// Removes the worker from the active set however it ends
struct ActiveGuard {
    connection_id: ConnectionId,
    active: Arc<Mutex<HashSet<ConnectionId>>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.connection_id);
    }
}

struct ScriptedWorker {
    script: Script,
    tunnels: Arc<Mutex<HashMap<ConnectionId, TunnelProbe>>>,
    _active: ActiveGuard,
}

impl ScriptedWorker {
    /// Hand a fresh mock tunnel to the manager
    fn establish(&self, ctx: &WorkerContext) -> Result<(), WorkerError> {
        let connection_id = ctx.connection_id();
        let (tunnel, probe) = MockTunnel::new(&format!("tunnel-{connection_id}"));
        lock(&self.tunnels).insert(connection_id, probe);
        if ctx.established(Box::new(tunnel)) {
            Ok(())
        } else {
            Err(WorkerError::Interrupted)
        }
    }

    async fn hold(&self, ctx: &WorkerContext) -> Result<(), WorkerError> {
        self.establish(ctx)?;
        ctx.interrupted().await;
        Err(WorkerError::Interrupted)
    }
}

#[async_trait]
impl SessionWorker for ScriptedWorker {
    async fn run(self: Box<Self>, ctx: WorkerContext) -> Result<(), WorkerError> {
        match self.script.clone() {
            Script::Succeed => self.hold(&ctx).await,
            Script::SucceedThenDrop(after) => {
                self.establish(&ctx)?;
                tokio::select! {
                    _ = ctx.interrupted() => Err(WorkerError::Interrupted),
                    _ = tokio::time::sleep(after) => {
                        Err(WorkerError::Dropped("scripted drop".to_string()))
                    }
                }
            }
            Script::Fail(message) => Err(WorkerError::Handshake(message)),
            Script::Hang => {
                ctx.interrupted().await;
                Err(WorkerError::Interrupted)
            }
            Script::Panic => panic!("scripted worker panic"),
            Script::Gated(gate) => {
                gate.notified().await;
                self.hold(&ctx).await
            }
        }
    }
}

/// Poll `condition` until it holds, panicking after five seconds
pub async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
