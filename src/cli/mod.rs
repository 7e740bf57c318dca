//! CLI commands for pistat using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;

use crate::agent::{self, AgentConfig};
use crate::config::{load_settings, load_settings_from, Settings};
use crate::controller::Controller;
use crate::logging;
use crate::telemetry;
use crate::web::{run_server, WebServerConfig};

/// pistat - Raspberry Pi fleet telemetry and task dispatch.
#[derive(Parser)]
#[command(name = "pistat")]
#[command(version)]
#[command(about = "Fleet controller and node agent for Raspberry Pi telemetry", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the controller (dashboard websockets, REST API, local tasks)
    Serve {
        /// Bind address
        #[arg(long, env = "PISTAT_HOST")]
        host: Option<String>,

        /// Port number
        #[arg(long, short, env = "PISTAT_PORT")]
        port: Option<u16>,

        /// Directory for label and assignment overrides
        #[arg(long, env = "PISTAT_STATE_DIR")]
        state_dir: Option<PathBuf>,

        /// Directory of static dashboard assets served at /
        #[arg(long, env = "PISTAT_STATIC_DIR")]
        static_dir: Option<PathBuf>,

        /// Settings file (defaults to ~/.pistat/settings.json)
        #[arg(long, short, env = "PISTAT_CONFIG")]
        config: Option<PathBuf>,

        /// Log level: debug, info, warning, error
        #[arg(long, env = "PISTAT_LOGLEVEL", default_value = "info")]
        log_level: String,
    },

    /// Run a node agent that reports to a controller
    Agent {
        /// Controller base URL, e.g. http://10.0.0.2:8000
        #[arg(long, env = "PISTAT_CONTROLLER")]
        controller: String,

        /// Node id (defaults to the host name)
        #[arg(long, env = "PISTAT_ID")]
        id: Option<String>,

        /// Friendly label reported at registration
        #[arg(long, env = "PISTAT_LABEL")]
        label: Option<String>,

        /// Seconds between stats reports
        #[arg(long, env = "PISTAT_INTERVAL", default_value_t = 5)]
        interval: u64,

        /// Register and report telemetry but never run tasks
        #[arg(long, env = "PISTAT_REGISTER_ONLY")]
        register_only: bool,

        /// Log level: debug, info, warning, error
        #[arg(long, env = "PISTAT_LOGLEVEL", default_value = "info")]
        log_level: String,
    },

    /// Print the task catalog
    Catalog {
        /// Settings file (defaults to ~/.pistat/settings.json)
        #[arg(long, short, env = "PISTAT_CONFIG")]
        config: Option<PathBuf>,
    },
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Serve {
                host,
                port,
                state_dir,
                static_dir,
                config,
                log_level,
            } => {
                let _guard = init_logging(log_level, "controller");
                let mut settings = read_settings(config.as_deref())?;
                if let Some(host) = host {
                    settings.server.host = host.clone();
                }
                if let Some(port) = port {
                    settings.server.port = *port;
                }
                if let Some(dir) = state_dir {
                    settings.server.state_dir = Some(dir.clone());
                }
                if let Some(dir) = static_dir {
                    settings.server.static_dir = Some(dir.clone());
                }
                cmd_serve(settings).await
            }
            Command::Agent {
                controller,
                id,
                label,
                interval,
                register_only,
                log_level,
            } => {
                let _guard = init_logging(log_level, "agent");
                cmd_agent(
                    controller,
                    id.as_deref(),
                    label.as_deref(),
                    *interval,
                    *register_only,
                )
                .await
            }
            Command::Catalog { config } => cmd_catalog(&read_settings(config.as_deref())?),
        }
    }
}

/// Logging failures are not fatal; the command still runs with stderr only.
fn init_logging(level: &str, prefix: &str) -> Option<WorkerGuard> {
    match logging::init(level, prefix) {
        Ok((guard, _)) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    }
}

/// An explicit settings path must exist; the default one is optional.
fn read_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Settings file not found: {}", path.display());
            }
            Ok(load_settings_from(path)?)
        }
        None => Ok(load_settings()?),
    }
}

// Command implementations

async fn cmd_serve(settings: Settings) -> Result<()> {
    let config = WebServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        static_dir: settings.server.static_dir.clone(),
    };
    let ctl = Arc::new(Controller::new(settings)?);

    println!("Starting pistat controller on {}:{}...", config.host, config.port);
    println!("Endpoints:");
    println!("  ws://{}:{}/ws/ui", config.host, config.port);
    println!("  ws://{}:{}/ws/pi", config.host, config.port);
    println!("  http://{}:{}/api/nodes", config.host, config.port);
    println!("  http://{}:{}/health", config.host, config.port);
    println!();
    println!("Press Ctrl+C to stop");

    run_server(ctl, config)
        .await
        .map_err(|e| anyhow::anyhow!("Controller error: {}", e))
}

async fn cmd_agent(
    controller: &str,
    id: Option<&str>,
    label: Option<&str>,
    interval: u64,
    register_only: bool,
) -> Result<()> {
    let node_id = match id {
        Some(id) => id.to_string(),
        None => telemetry::host_name()
            .ok_or_else(|| anyhow::anyhow!("Could not determine host name; pass --id"))?,
    };
    let config = AgentConfig::new(
        controller,
        &node_id,
        label,
        Duration::from_secs(interval),
        register_only,
    )?;

    agent::run(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    })
    .await?;
    Ok(())
}

fn cmd_catalog(settings: &Settings) -> Result<()> {
    let catalog = settings.catalog();
    if catalog.is_empty() {
        println!("No tasks configured.");
        return Ok(());
    }

    println!("{:<16} {:<24} COMMAND", "ID", "LABEL");
    for entry in catalog.entries() {
        println!("{:<16} {:<24} {}", entry.id, entry.label, entry.command_preview);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_serve_flags() {
        let args = Commands::try_parse_from(["pistat", "serve", "--port", "9100", "--host", "127.0.0.1"])
            .unwrap();
        match args.command {
            Command::Serve { host, port, log_level, .. } => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(9100));
                assert_eq!(log_level, "info");
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_agent_flags() {
        let args = Commands::try_parse_from([
            "pistat",
            "agent",
            "--controller",
            "http://10.0.0.2:8000",
            "--id",
            "rpi-07",
            "--register-only",
        ])
        .unwrap();
        match args.command {
            Command::Agent {
                controller,
                id,
                interval,
                register_only,
                ..
            } => {
                assert_eq!(controller, "http://10.0.0.2:8000");
                assert_eq!(id.as_deref(), Some("rpi-07"));
                assert_eq!(interval, 5);
                assert!(register_only);
            }
            _ => panic!("expected agent"),
        }
    }

    #[test]
    fn test_explicit_settings_path_must_exist() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_settings(Some(&temp_dir.path().join("nope.json"))).is_err());

        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "server": { "port": 9200 } }"#).unwrap();
        assert_eq!(read_settings(Some(&path)).unwrap().server.port, 9200);
    }
}
