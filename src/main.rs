// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use multirig::config::ConfigFile;
use multirig::logging::init_logging;
use multirig::{AppConfig, Registry};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - Hamlib rig coordination layer");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Override the configured log level (trace/debug/info/warn/error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
    /// Override the configured rigctl listener port
    #[arg(long = "port")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        (AppConfig::load_from_file(path)?, Some(path.clone()))
    } else {
        AppConfig::load_from_default_paths()?
    };

    init_logging(cli.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("loaded configuration from {}", path.display());
    } else {
        info!("no configuration file found on the search path; starting with an empty rig set");
    }

    if let Some(port) = cli.port {
        cfg.rigctl_listen_port = port;
    }

    if let Err(e) = cfg.validate() {
        error!(%e, "invalid configuration");
        return Err(e.into());
    }

    info!(
        rigs = cfg.rigs.len(),
        listen = %format!("{}:{}", cfg.rigctl_listen_host, cfg.rigctl_listen_port),
        "starting multirig"
    );

    let registry = Registry::new(cfg).await?;

    signal::ctrl_c().await?;
    info!("ctrl+c received, shutting down");
    registry.shutdown().await;

    Ok(())
}
