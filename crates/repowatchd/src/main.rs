//! repowatchd
//!
//! Loads the watch configuration, starts the repository monitor and runs
//! until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use repowatch::{
    load_config, DockerConfigAuth, Monitor, RegistryAuth, SharedConfig, StaticAuth,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "repowatchd", version, about = "Watch git repositories and publish images on new commits")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "REPOWATCH_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Treat every registry as authenticated
    #[arg(long)]
    no_auth_check: bool,
}

fn init_logging(format: LogFormat) -> Result<()> {
    // The git layer logs through the `log` facade.
    tracing_log::LogTracer::init().context("Failed to install log bridge")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "repowatch=info,repowatchd=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => {
            tracing::subscriber::set_global_default(registry.with(tracing_subscriber::fmt::layer()))
        }
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().json()),
        ),
    }
    .context("Failed to initialize logging")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format)?;

    info!("Starting repowatchd v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    info!(
        "Loaded configuration: {} repositories, registry {}, polling every {} min",
        config.repositories.len(),
        config.registry,
        config.poll_interval_minutes
    );

    let auth: Arc<dyn RegistryAuth> = if args.no_auth_check {
        info!("Registry auth check disabled");
        Arc::new(StaticAuth(true))
    } else {
        let auth = DockerConfigAuth::from_env();
        info!("Reading registry credentials from {}", auth.config_path().display());
        Arc::new(auth)
    };

    let shared = SharedConfig::new(config);
    let monitor = Monitor::with_defaults(Arc::new(shared), auth);
    monitor.start().context("Failed to start monitor")?;

    let shutdown = Arc::new(Notify::new());
    let notify = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        notify.notify_one();
    })
    .context("Failed to set Ctrl-C handler")?;

    shutdown.notified().await;
    info!("Shutdown requested");
    monitor.stop().context("Failed to stop monitor")?;

    Ok(())
}
