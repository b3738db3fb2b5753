//! Reference worker over a plain TCP stream
//!
//! The handshake is deliberately minimal: a control byte followed by the
//! shared secret, answered by a single control byte. Packet relay is not
//! done here; the worker only watches the stream so it can report a drop.

use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::traits::{SessionWorker, TunnelHandle, WorkerFactory};
use crate::error::WorkerError;
use crate::lifecycle::WorkerContext;
use crate::params::{ConnectionId, SessionParameters};

const CONTROL_BYTE: u8 = 0;

/// Tunnel handle backed by a cloned TCP socket
pub struct TcpTunnel {
    stream: std::net::TcpStream,
    peer: Option<SocketAddr>,
}

impl TcpTunnel {
    fn new(stream: std::net::TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self { stream, peer }
    }
}

impl TunnelHandle for TcpTunnel {
    fn close(&mut self) -> std::io::Result<()> {
        // Shutting down the shared socket also wakes the worker's read
        self.stream.shutdown(Shutdown::Both)
    }

    fn describe(&self) -> String {
        match self.peer {
            Some(peer) => format!("tcp {peer}"),
            None => "tcp <unknown peer>".to_string(),
        }
    }
}

/// Creates [`TcpSessionWorker`]s
#[derive(Debug, Clone)]
pub struct TcpWorkerFactory {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for TcpWorkerFactory {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl WorkerFactory for TcpWorkerFactory {
    fn create(
        &self,
        _params: &SessionParameters,
        _connection_id: ConnectionId,
    ) -> Box<dyn SessionWorker> {
        Box::new(TcpSessionWorker {
            connect_timeout: self.connect_timeout,
            handshake_timeout: self.handshake_timeout,
        })
    }
}

pub struct TcpSessionWorker {
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl TcpSessionWorker {
    async fn handshake(&self, ctx: &WorkerContext) -> Result<TcpStream, WorkerError> {
        let params = ctx.parameters();
        let endpoint = params.endpoint();

        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| {
                WorkerError::Connect(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect to {endpoint} timed out"),
                ))
            })?
            .map_err(WorkerError::Connect)?;

        let mut hello = Vec::with_capacity(params.secret().len() + 1);
        hello.push(CONTROL_BYTE);
        hello.extend_from_slice(params.secret());
        stream
            .write_all(&hello)
            .await
            .map_err(|e| WorkerError::Handshake(e.to_string()))?;

        let mut reply = [0u8; 1];
        let read = tokio::time::timeout(self.handshake_timeout, stream.read(&mut reply))
            .await
            .map_err(|_| WorkerError::Handshake("no reply from server".to_string()))?
            .map_err(|e| WorkerError::Handshake(e.to_string()))?;

        match (read, reply[0]) {
            (0, _) => Err(WorkerError::Handshake(
                "server closed during handshake".to_string(),
            )),
            (_, CONTROL_BYTE) => Ok(stream),
            (_, other) => Err(WorkerError::Handshake(format!(
                "unexpected reply byte {other:#04x}"
            ))),
        }
    }
}

#[async_trait]
impl SessionWorker for TcpSessionWorker {
    async fn run(self: Box<Self>, ctx: WorkerContext) -> Result<(), WorkerError> {
        let connection_id = ctx.connection_id();
        debug!(connection_id, endpoint = %ctx.parameters().endpoint(), "Starting handshake");

        let stream = tokio::select! {
            _ = ctx.interrupted() => return Err(WorkerError::Interrupted),
            result = self.handshake(&ctx) => result?,
        };

        let std_stream = stream.into_std().map_err(WorkerError::Connect)?;
        let tunnel = TcpTunnel::new(std_stream.try_clone().map_err(WorkerError::Connect)?);
        let mut stream = TcpStream::from_std(std_stream).map_err(WorkerError::Connect)?;

        if !ctx.established(Box::new(tunnel)) {
            return Err(WorkerError::Interrupted);
        }
        info!(connection_id, "Tunnel up");

        let mut buf = vec![0u8; 4096];
        loop {
            tokio::select! {
                _ = ctx.interrupted() => return Err(WorkerError::Interrupted),
                read = stream.read(&mut buf) => match read {
                    Ok(0) => return Err(WorkerError::Dropped("peer closed the connection".to_string())),
                    Ok(_) => continue,
                    Err(e) => return Err(WorkerError::Dropped(e.to_string())),
                },
            }
        }
    }
}
