use anyhow::Context;
use clap::{Parser, ValueEnum};
use decoy_server::loader::{load_mocks, register_mocks};
use decoy_server::matcher::AssertionRegistry;
use decoy_server::{Config, MockServer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "decoy", version, about = "Programmable HTTP mock server")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "DECOY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    host: Option<String>,

    /// History entries kept per session (0 keeps everything)
    #[arg(long)]
    history_max_retention: Option<usize>,

    /// Mock definitions (YAML or JSON) registered at startup
    #[arg(short, long)]
    mocks: Option<PathBuf>,

    /// Overridden by the DECOY_LOG environment variable
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Human)]
    log_format: LogFormat,
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_env("DECOY_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Human => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if let Some(host) = &args.host {
        config.listen.host = host.clone();
    }
    if let Some(retention) = args.history_max_retention {
        config.history_max_retention = retention;
    }
    if let Some(mocks) = &args.mocks {
        config.mocks_file = Some(mocks.clone());
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config.log_level, args.log_format);

    let server = MockServer::bind(&config).await?;

    if let Some(path) = &config.mocks_file {
        let definitions = load_mocks(path)?;
        let store = server.store();
        let session_id = store.last_session_id();
        register_mocks(
            store.as_ref(),
            &session_id,
            definitions,
            &AssertionRegistry::standard(),
        )
        .with_context(|| format!("Failed to register mocks from {}", path.display()))?;
    }

    info!("Decoy listening on {}", server.local_addr());
    let shutdown = server.shutdown_sender();
    let running = tokio::spawn(server.run());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    let _ = shutdown.send(());
    running.await.context("Mock server task failed")?;
    Ok(())
}
