mod banner;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use regdesk_common::SECRET_PLACEHOLDER;
use regdesk_config::{AppConfig, ConfigLoader, mask_url};
use regdesk_db::{Connector, Migrator, NativeConnector, StartupOrchestrator};
use regdesk_gateway::{GatewayServer, shutdown_signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "regdesk", version, about = "Event registration backend")]
struct Cli {
    /// Config file (.yml, .yaml or .toml); environment variables override it.
    #[arg(long, global = true, env = "REGDESK_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Prepare the database, then serve the HTTP API (default).
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Prepare the database and exit.
    Migrate,
    /// Revert migrations newer than TARGET ("base" reverts all).
    Downgrade { target: String },
    /// Show applied and pending migrations.
    Status,
    /// Print the effective configuration with secrets masked.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            let head = Migrator::registered().head()?;
            banner::print_banner(&config.gateway.host, config.gateway.port, &config, head);
            GatewayServer::new(config).run().await?;
        }
        Commands::Migrate => {
            let mut orchestrator = orchestrator(&config)?;
            let outcome = orchestrator.run_until(shutdown_signal()).await?;
            println!("schema ready: {outcome:?}");
        }
        Commands::Downgrade { target } => {
            let mut orchestrator = orchestrator(&config)?;
            orchestrator.probe_until(shutdown_signal()).await?;
            let target = (target != "base").then_some(target);
            let reverted = orchestrator
                .migrator()
                .downgrade_to(
                    orchestrator.connector().as_ref(),
                    orchestrator.endpoint(),
                    target.as_deref(),
                )
                .await?;
            info!("reverted {reverted} migration(s)");
            println!("reverted {reverted} migration(s)");
        }
        Commands::Status => {
            let mut orchestrator = orchestrator(&config)?;
            orchestrator.probe_until(shutdown_signal()).await?;
            let status = orchestrator
                .migrator()
                .status(orchestrator.connector().as_ref(), orchestrator.endpoint())
                .await?;
            println!("applied: {}", list_or_none(&status.applied));
            println!("pending: {}", list_or_none(&status.pending));
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&redacted(config))?);
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

fn orchestrator(config: &AppConfig) -> Result<StartupOrchestrator> {
    let connector: Arc<dyn Connector> = Arc::new(NativeConnector);
    Ok(StartupOrchestrator::new(&config.database, connector)?)
}

fn list_or_none(ids: &[&str]) -> String {
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join(", ")
    }
}

fn redacted(mut config: AppConfig) -> AppConfig {
    config.database.url = mask_url(&config.database.url);
    config.database.admin_url = config.database.admin_url.as_deref().map(mask_url);
    if config.gateway.api_key.is_some() {
        config.gateway.api_key = Some(SECRET_PLACEHOLDER.to_string());
    }
    config
}
