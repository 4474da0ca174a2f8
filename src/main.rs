use anyhow::{Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convert_gateway::{
    config::Config,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "convert-gateway")]
#[command(version)]
#[command(about = "File-format conversion gateway with signed, stateless session tokens")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("convert_gateway={0},staging_file_manager={0}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting convert-gateway v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    config.validate()?;

    let state = AppState::from_config(&config).await?;

    let missing = state.registry.validate_tools(&config.tools).await;
    if !missing.is_empty() {
        if config.conversion.strict_tool_check {
            bail!(
                "{} conversion(s) cannot run because their tools are missing \
                 (conversion.strict_tool_check = true)",
                missing.len()
            );
        }
        warn!(
            "{} conversion(s) are registered but their tools are missing",
            missing.len()
        );
    }

    if config.storage.sweep_on_startup {
        let swept = state.sweep_leftovers().await;
        if swept > 0 {
            info!(
                "Scheduled {} leftover file(s) from a previous run for cleanup",
                swept
            );
        }
    }

    let web_server = WebServer::new(&config, state)?;
    info!("Starting web server on {}", web_server.addr());
    web_server.serve().await?;

    Ok(())
}
