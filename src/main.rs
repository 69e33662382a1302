//! picam-stream binary
//!
//! Runs the coordinator with the HTTP surface and button control.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:5000, display loop enabled
//! picam-stream
//!
//! # Custom config file and port, no display panel
//! picam-stream --config picam.toml --port 8080 --no-display
//!
//! # JSON logs
//! RUST_LOG=picam_stream=debug picam-stream --log-json
//! ```
//!
//! Button presses are read from stdin, one per line: `1`/`start`,
//! `2`/`exit`, `3`/`stop`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use picam_stream::controls::{feed_from_lines, run_button_loop, Debouncer};
use picam_stream::device::{HeadlessDisplay, SyntheticSource};
use picam_stream::display::welcome_message;
use picam_stream::{HttpServer, Settings, StreamCoordinator};

#[derive(Debug, Parser)]
#[command(name = "picam-stream", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides the config file)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Port (overrides the bind address port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Do not drive the display panel
    #[arg(long)]
    no_display: bool,

    /// Start streaming immediately
    #[arg(long)]
    autostart: bool,

    /// Synthetic source resolution, WIDTHxHEIGHT
    #[arg(long, default_value = "640x480", value_parser = parse_resolution)]
    resolution: (u32, u32),
}

fn parse_resolution(s: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let w = w.parse().map_err(|e| format!("bad width: {e}"))?;
    let h = h.parse().map_err(|e| format!("bad height: {e}"))?;
    Ok((w, h))
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                token.cancelled().await;
            }
        }
        _ = token.cancelled() => {}
    }
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Settings::default(),
    };
    if args.no_display {
        settings.display.enabled = false;
    }

    let mut server_config = settings.server_config().context("Invalid server settings")?;
    if let Some(bind) = args.bind {
        server_config.bind_addr = bind;
    }
    if let Some(port) = args.port {
        server_config.bind_addr.set_port(port);
    }

    let (width, height) = args.resolution;
    let source = Arc::new(SyntheticSource::new(width, height));
    let display = Arc::new(HeadlessDisplay::new(
        settings.display.width,
        settings.display.height,
    ));
    let probe = settings.probe(source.clone());
    let coordinator = StreamCoordinator::with_probe(
        source,
        display,
        probe,
        settings.coordinator_config(),
    );

    info!(
        addr = %server_config.bind_addr,
        display = settings.display.enabled,
        probe = ?settings.health.probe,
        "picam-stream starting"
    );

    coordinator
        .show_message(welcome_message(coordinator.status().network_stable).to_vec())
        .await;

    if args.autostart {
        if let Err(e) = coordinator.start().await {
            warn!(error = %e, "Autostart failed");
        }
    }

    let shutdown = CancellationToken::new();

    // Buttons: stdin, read on a plain thread, stands in for the GPIO poller
    let (button_tx, button_rx) = mpsc::channel(16);
    std::thread::spawn(move || feed_from_lines(std::io::stdin().lock(), button_tx));
    let buttons = tokio::spawn(run_button_loop(
        coordinator.clone(),
        button_rx,
        Debouncer::new(settings.debounce()),
        shutdown.clone(),
    ));

    let server = HttpServer::new(server_config, coordinator.clone());
    server
        .run_until(shutdown_signal(shutdown.clone()))
        .await
        .context("HTTP server failed")?;

    shutdown.cancel();
    let _ = buttons.await;
    coordinator.stop().await?;
    coordinator.clear_display().await;

    info!("picam-stream stopped");
    Ok(())
}
