//! Bring the tunnel up and keep it up until interrupted

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tunkeeper_core::lifecycle::RECONNECT_EXHAUSTED;
use tunkeeper_core::{
    BroadcastSink, ConnectionManager, FallbackServer, FanoutSink, ReconnectPolicy,
    SelectionOrFallback, ServerDirectory, StatusSink, StatusUpdate, TcpWorkerFactory,
};

use crate::config::{ConfigLoader, TunkeeperConfig};

/// Arguments for the connect command
#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Server to select from the directory (first entry when omitted)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Server directory JSON to read instead of the configured one
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Fallback server address, overriding the config
    #[arg(long)]
    pub address: Option<String>,

    /// Fallback server port, overriding the config
    #[arg(long)]
    pub port: Option<String>,

    /// Fallback shared secret, overriding the config
    #[arg(long)]
    pub secret: Option<String>,

    /// Seconds to wait for the TCP connection
    #[arg(long, default_value_t = 15)]
    pub connect_timeout: u64,
}

/// Prints every transition, like a persistent notification would show it
struct TerminalIndicator;

impl StatusSink for TerminalIndicator {
    fn on_status(&self, update: &StatusUpdate) {
        println!(
            "[{}] {}",
            update.at.format("%H:%M:%S"),
            update.display_text()
        );
    }

    fn release(&self) {
        debug!("Indicator released");
    }
}

pub async fn run(args: ConnectArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let source = build_source(&config, &args, &tunkeeper_paths::server_directory_file())?;

    let broadcast = Arc::new(BroadcastSink::default());
    let mut updates = broadcast.subscribe();
    let sink = Arc::new(FanoutSink::new(vec![
        Arc::new(TerminalIndicator) as Arc<dyn StatusSink>,
        broadcast,
    ]));

    let factory = TcpWorkerFactory {
        connect_timeout: Duration::from_secs(args.connect_timeout),
        ..TcpWorkerFactory::default()
    };
    let policy = ReconnectPolicy::from(&config.reconnect);
    info!(mode = config.reconnect.mode.as_str(), "Reconnect policy");

    let signal = shutdown_signal().context("Installing signal handlers")?;
    tokio::pin!(signal);

    let manager = ConnectionManager::new(Arc::new(factory), sink, policy);
    manager
        .start_from_source(&source)
        .context("Not connecting")?;

    let result = loop {
        tokio::select! {
            name = &mut signal => {
                info!(signal = name, "Disconnecting");
                break Ok(());
            }
            update = updates.recv() => match update {
                Ok(update) if update.reason.as_deref() == Some(RECONNECT_EXHAUSTED) => {
                    break Err(anyhow::anyhow!("Gave up: {}", RECONNECT_EXHAUSTED));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status updates lagged");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    manager.shutdown();
    result
}

/// Resolves on Ctrl+C, or on SIGTERM.
///
/// The SIGTERM handler is installed before this returns, so a signal that
/// arrives before the future is first polled still ends in shutdown.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl+C"
    })
}

/// The selected directory entry when a directory is available, otherwise
/// the fallback server from config and flags.
///
/// `default_directory` is only consulted when it exists.
fn build_source(
    config: &TunkeeperConfig,
    args: &ConnectArgs,
    default_directory: &Path,
) -> Result<SelectionOrFallback> {
    let mut fallback: FallbackServer = config.fallback.clone();
    if let Some(address) = &args.address {
        fallback.address = address.clone();
    }
    if let Some(port) = &args.port {
        fallback.port = port.clone();
    }
    if let Some(secret) = &args.secret {
        fallback.secret = secret.clone();
    }

    let explicit_path = args.directory.clone().or(config.directory.path.clone());
    let server = args.server.as_deref().or(config.directory.server.as_deref());

    let path = match explicit_path {
        Some(path) => Some(path),
        None => default_directory
            .exists()
            .then(|| default_directory.to_path_buf()),
    };

    let selected = match path {
        Some(path) => {
            let directory = ServerDirectory::load(&path)
                .with_context(|| format!("loading server directory {}", path.display()))?;
            let entry = directory
                .select(server)
                .with_context(|| format!("available servers: {}", directory.names().join(", ")))?;
            info!(server = %entry.name, "Selected server");
            Some(entry.clone())
        }
        None if server.is_some() => {
            bail!("A server name was given but no server directory is available")
        }
        None => None,
    };

    if selected.is_none() && !fallback.is_configured() {
        bail!(
            "No server configured: pass --address/--port/--secret, set [fallback] in {}, or provide a server directory",
            ConfigLoader::user_config_path().display()
        );
    }

    Ok(SelectionOrFallback::new(selected, fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::TempDir;
    use tunkeeper_core::ParameterSource;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        connect: ConnectArgs,
    }

    fn args(argv: &[&str]) -> ConnectArgs {
        let mut full = vec!["test"];
        full.extend_from_slice(argv);
        TestCli::parse_from(full).connect
    }

    fn missing(dir: &TempDir) -> PathBuf {
        dir.path().join("absent.json")
    }

    fn write_directory(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("servers.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"{"servers": [
                {"name": "Frankfurt", "address": "10.0.0.1", "port": 8000, "secret": "a"},
                {"name": "Oslo", "address": "10.0.0.2", "port": 443, "secret": "b"}
            ]}"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_connect_defaults() {
        let args = args(&[]);
        assert!(args.server.is_none());
        assert!(args.directory.is_none());
        assert_eq!(args.connect_timeout, 15);
    }

    #[test]
    fn test_connect_with_server_and_directory() {
        let args = args(&["--server", "Oslo", "-d", "/tmp/servers.json"]);
        assert_eq!(args.server.as_deref(), Some("Oslo"));
        assert_eq!(args.directory, Some(PathBuf::from("/tmp/servers.json")));
    }

    #[test]
    fn test_source_selects_named_server() {
        let dir = TempDir::new().unwrap();
        let path = write_directory(&dir);
        let args = args(&["--server", "Oslo", "--directory", path.to_str().unwrap()]);

        let source = build_source(&TunkeeperConfig::default(), &args, &missing(&dir)).unwrap();
        let params = source.resolve().unwrap();
        assert_eq!(params.endpoint(), "10.0.0.2:443");
    }

    #[test]
    fn test_source_uses_default_directory_when_present() {
        let dir = TempDir::new().unwrap();
        let path = write_directory(&dir);

        let source = build_source(&TunkeeperConfig::default(), &args(&[]), &path).unwrap();
        assert_eq!(source.selected.unwrap().name, "Frankfurt");
    }

    #[test]
    fn test_source_unknown_server_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write_directory(&dir);
        let args = args(&["--server", "Lima", "--directory", path.to_str().unwrap()]);

        let err = build_source(&TunkeeperConfig::default(), &args, &missing(&dir)).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Server not found in directory: Lima"), "{message}");
        assert!(message.contains("available servers: Frankfurt, Oslo"), "{message}");
    }

    #[test]
    fn test_source_server_without_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let args = args(&["--server", "Oslo", "--address", "10.0.0.1"]);

        assert!(build_source(&TunkeeperConfig::default(), &args, &missing(&dir)).is_err());
    }

    #[test]
    fn test_source_requires_some_server() {
        let dir = TempDir::new().unwrap();
        let err = build_source(&TunkeeperConfig::default(), &args(&[]), &missing(&dir))
            .unwrap_err();
        assert!(err.to_string().contains("No server configured"));
    }

    #[test]
    fn test_source_flags_override_fallback() {
        let dir = TempDir::new().unwrap();
        let mut config = TunkeeperConfig::default();
        config.fallback = FallbackServer::new("10.9.9.9", "8000", "cfg");

        let source = build_source(&config, &args(&["--port", "9000"]), &missing(&dir)).unwrap();
        assert!(source.selected.is_none());
        assert_eq!(source.fallback, FallbackServer::new("10.9.9.9", "9000", "cfg"));
    }

    #[test]
    fn test_source_keeps_malformed_port_for_start_time() {
        let dir = TempDir::new().unwrap();
        let args = args(&["--address", "10.0.0.1", "--port", "80a", "--secret", "s"]);

        let source = build_source(&TunkeeperConfig::default(), &args, &missing(&dir)).unwrap();
        assert!(source.resolve().is_err());
    }

    #[test]
    fn test_source_unreadable_configured_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut config = TunkeeperConfig::default();
        config.fallback = FallbackServer::new("10.0.0.1", "8000", "s");
        config.directory.path = Some(missing(&dir));

        assert!(build_source(&config, &args(&[]), &missing(&dir)).is_err());
    }
}
