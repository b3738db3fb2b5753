//! Session workers: the boundary to whatever actually builds the tunnel

pub mod tcp;
pub mod traits;

pub use tcp::{TcpSessionWorker, TcpTunnel, TcpWorkerFactory};
pub use traits::{SessionWorker, TunnelHandle, WorkerFactory};
