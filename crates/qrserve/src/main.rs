use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qrserve::config::{FileConfig, Overrides};
use qrserve::server::shutdown_signal;
use qrserve::{Server, ServerConfig, announce, net};

#[derive(Parser, Debug)]
#[command(name = "qrserve")]
#[command(about = "Serve the current directory on the local network and print a QR code to reach it")]
#[command(version)]
struct Cli {
    /// Port to listen on (default 8000)
    #[arg(short, long, env = "QRSERVE_PORT")]
    port: Option<u16>,

    /// Root directory to serve files from (default: working directory)
    #[arg(short, long, env = "QRSERVE_ROOT")]
    root: Option<PathBuf>,

    /// Headline shown above the connection details
    #[arg(long, env = "QRSERVE_TITLE")]
    title: Option<String>,

    /// Config file path (optional)
    #[arg(short, long, env = "QRSERVE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "QRSERVE_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "qrserve=debug,tower_http=debug"
    } else {
        "qrserve=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let file_config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let overrides = Overrides {
        port: cli.port,
        root: cli.root,
        title: cli.title,
    };
    let config = ServerConfig::layered(file_config, overrides).canonicalize_root()?;

    // Watch for Ctrl+C from here on so an interrupt during startup still exits cleanly.
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();

            shutdown_signal().await;
            warn!("Second interrupt, exiting without waiting for connections");
            std::process::exit(130);
        }
    });

    let ip = net::resolve();

    // Bind before announcing so a busy port never shows a stale QR code.
    let server = Server::bind(&config)
        .await
        .with_context(|| format!("cannot start server on port {}", config.port))?;

    announce::announce(&config.title, ip, config.port).context("cannot show connection details")?;

    server.run(shutdown).await.context("running server")?;

    println!("\nServer stopped.");
    Ok(())
}
