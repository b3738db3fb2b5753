//! Connection lifecycle: slots, reconnect policy and the manager that owns them

mod manager;
mod outbox;
pub mod reconnect;
mod slots;

pub use manager::{ConnectionManager, RECONNECT_EXHAUSTED, WorkerContext};
pub use reconnect::ReconnectPolicy;
pub use slots::{EstablishedSession, ManagerSnapshot, WorkerHandle};
