pub mod config;
pub mod connect;
pub mod servers;
