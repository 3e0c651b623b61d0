//! Wavelog Relay CLI - listen for logger contact broadcasts and upload them to Wavelog.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wavelog_relay::{
    config::Config,
    delivery::{HttpEndpoint, WavelogClient},
    listener::{Listener, Relay},
    metrics::start_metrics_server,
    report::{Fanout, Reporter, TracingReporter},
    stats::RelayStats,
};

/// Wavelog Relay - Forward contest logger contacts to Wavelog as ADIF
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file (defaults to the platform config directory)
    #[arg(short, long, env = "WAVELOG_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(long)]
    listen_address: Option<String>,

    /// UDP port to listen on (overrides the config file)
    #[arg(short = 'p', long)]
    udp_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Console logging, plus an optional plain-text log file.
fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => Config::config_path()
            .context("Could not determine the config directory; pass --config")?,
    };

    let Some(mut config) = Config::load_from(&config_path)? else {
        println!("Created config template at {}", config_path.display());
        println!("Fill in wavelog_url, api_key and station_profile_id, then start again.");
        return Ok(());
    };

    if let Some(address) = args.listen_address {
        config.listen_address = address;
    }
    if let Some(port) = args.udp_port {
        config.udp_port = port;
    }

    init_logging(&args.log_level, config.log_file.as_deref())?;

    config
        .validate()
        .with_context(|| format!("Edit {} and try again", config_path.display()))?;

    info!("Wavelog Relay starting...");
    info!("Config: {}", config_path.display());
    info!("Forwarding to: {}", config.target().qso_url());

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle Ctrl+C
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let stats = Arc::new(RelayStats::new());
    let reporter: Arc<dyn Reporter> = Arc::new(
        Fanout::new()
            .with(Arc::new(TracingReporter))
            .with(Arc::clone(&stats) as Arc<dyn Reporter>),
    );

    if config.metrics_enabled {
        let stats = Arc::clone(&stats);
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(port, stats).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    if config.stats_interval > 0 {
        let stats = Arc::clone(&stats);
        let period = Duration::from_secs(config.stats_interval);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                println!("\n{}", stats.summary());
            }
        });
    }

    let target = config.target();
    let endpoint = HttpEndpoint::new(&target, config.request_timeout())?;
    let client = WavelogClient::new(
        endpoint,
        target,
        config.retry_policy(),
        Arc::clone(&reporter),
    )
    .with_shutdown(shutdown_rx.clone());
    let relay = Relay::new(client, config.encoder_options(), reporter);

    let listener = match Listener::bind(&config.listen_addr(), relay).await {
        Ok(listener) => listener,
        Err(e) => {
            if e.is_addr_in_use() {
                error!(
                    "Port {} is already in use. Is another instance running? Change udp_port in {}",
                    config.udp_port,
                    config_path.display()
                );
            }
            return Err(e.into());
        }
    };

    info!("Waiting for logger data... (Ctrl+C to stop)");
    listener.run(shutdown_rx).await;

    // Print final statistics
    println!("\n\nFINAL STATISTICS");
    println!("{}", stats.summary());

    info!("Relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "wavelog-relay",
            "--config",
            "/tmp/relay.toml",
            "--listen-address",
            "127.0.0.1",
            "-p",
            "12060",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/relay.toml")));
        assert_eq!(args.listen_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(args.udp_port, Some(12060));
        assert_eq!(args.log_level, "info");
    }
}
