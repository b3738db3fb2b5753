//! List the servers in the directory

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tunkeeper_core::ServerDirectory;

use crate::config::ConfigLoader;

/// Arguments for the servers command
#[derive(Debug, Args)]
pub struct ServersArgs {
    /// Server directory JSON to read instead of the configured one
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Print the directory as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ServersArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let path = args
        .directory
        .or(config.directory.path)
        .unwrap_or_else(tunkeeper_paths::server_directory_file);

    let directory = ServerDirectory::load(&path)
        .with_context(|| format!("loading server directory {}", path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&directory)?);
        return Ok(());
    }

    let selected = directory
        .select(config.directory.server.as_deref())
        .ok()
        .map(|entry| entry.name.clone());
    print!("{}", format_listing(&directory, selected.as_deref()));
    Ok(())
}

/// One line per server, the selected one marked with `*`
fn format_listing(directory: &ServerDirectory, selected: Option<&str>) -> String {
    if directory.servers.is_empty() {
        return "No servers in directory\n".to_string();
    }

    let width = directory
        .servers
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0);

    directory
        .servers
        .iter()
        .map(|s| {
            let marker = if Some(s.name.as_str()) == selected { '*' } else { ' ' };
            format!("{marker} {:<width$}  {}:{}\n", s.name, s.address, s.port)
        })
        .collect()
}
