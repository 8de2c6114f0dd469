use anyhow::Context;
use clap::Parser;
use fetchit::config::{Config, LoggingConfig};
use fetchit::credentials::CredentialStore;
use fetchit::logging;
use fetchit::pipeline::UpdateService;
use fetchit::server::UpdateServer;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser)]
#[clap(
    version,
    about = "Authenticated dynamic DNS update relay"
)]
struct Args {
    #[clap(short, long, value_name = "FILE", help = "Configuration file path")]
    config: Option<PathBuf>,

    #[clap(long, value_name = "FILE", help = "Credential file path (JSONC)")]
    credentials: Option<PathBuf>,

    #[clap(long, value_name = "HOST", help = "Interface to listen on")]
    host: Option<String>,

    #[clap(short, long, value_name = "PORT", help = "Port to listen on")]
    port: Option<u16>,

    #[clap(short, long, help = "Enable debug logging")]
    debug: bool,

    #[clap(long, value_name = "LEVEL", value_parser = logging::parse_log_level, help = "Log level: trace, debug, info, warn, error")]
    log_level: Option<fetchit::config::LogLevel>,

    #[clap(long, value_name = "FILE", help = "Generate a sample configuration file")]
    generate_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.generate_config {
        Config::default()
            .to_file(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Sample configuration file generated: {}", path.display());
        return Ok(());
    }

    let (mut config, config_path) = Config::discover(args.config.as_deref()).context("failed to load configuration")?;
    apply_args(&mut config, &args);

    let logging_config = config.logging.clone().unwrap_or_default();
    logging::init(&logging_config, config.debug).context("failed to initialize logging")?;

    match &config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    config.validate().context("invalid configuration")?;

    let credentials_path = args.credentials.clone().or_else(|| config.credentials_file.clone());
    let store = CredentialStore::discover(credentials_path.as_deref()).context("failed to load credentials")?;
    if store.is_empty() {
        anyhow::bail!("credential file defines no users");
    }
    info!("Loaded {} credential record(s)", store.len());

    let service = UpdateService::from_config(&config, Arc::new(store));
    let server = UpdateServer::new(config, service);

    info!("Starting fetchit {}...", env!("CARGO_PKG_VERSION"));
    let server_handle = tokio::spawn(async move { server.run().await });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    info!("fetchit stopped");
    Ok(())
}

fn apply_args(config: &mut Config, args: &Args) {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.debug {
        config.debug = true;
    }
    if let Some(level) = &args.log_level {
        let logging = config.logging.get_or_insert_with(LoggingConfig::default);
        logging.level = Some(level.clone());
    }
}
