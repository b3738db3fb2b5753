use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "tunkeeper", about = "Keeps a single VPN tunnel session up")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and stay connected until interrupted
    Connect(commands::connect::ConnectArgs),
    /// List servers in the server directory
    Servers(commands::servers::ServersArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Connect(args) => commands::connect::run(args).await,
        Commands::Servers(args) => commands::servers::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::parse_from(["tunkeeper", "config", "show", "--verbose"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Config(_)));
    }

    #[test]
    fn test_connect_subcommand() {
        let cli = Cli::parse_from(["tunkeeper", "connect", "--server", "Oslo"]);
        match cli.command {
            Commands::Connect(args) => assert_eq!(args.server.as_deref(), Some("Oslo")),
            _ => panic!("expected connect"),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
