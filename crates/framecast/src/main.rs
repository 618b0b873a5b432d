//! # framecast
//!
//! framecast server binary: loads settings, starts the HTTP/WebSocket
//! server and shuts it down on ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use framecast_core::logging::{LogFormat, init_subscriber};
use framecast_core::pattern::PatternKind;
use framecast_server::FramecastServer;
use framecast_core::constants::{NAME, VERSION};
use framecast_settings::{FramecastSettings, load_settings, load_settings_from_path, settings_path};

/// Real-time frame push server.
#[derive(Parser, Debug)]
#[command(name = "framecast", version, about = "Real-time frame push server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `$FRAMECAST_SETTINGS` or `~/.framecast/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `framecast_server=trace`.
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Frame pattern for new sessions.
    #[arg(long, value_parser = parse_pattern)]
    pattern: Option<PatternKind>,

    /// Evict each session when its stream ends.
    #[arg(long)]
    single_use: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut FramecastSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        if let Some(pattern) = self.pattern {
            settings.session.pattern = pattern;
        }
        if self.single_use {
            settings.session.single_use = true;
        }
    }
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    match s {
        "compact" => Ok(LogFormat::Compact),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format '{other}' (expected compact or json)")),
    }
}

fn parse_pattern(s: &str) -> Result<PatternKind, String> {
    match s {
        "quadrants" => Ok(PatternKind::Quadrants),
        "canvas" => Ok(PatternKind::Canvas),
        other => Err(format!("unknown pattern '{other}' (expected quadrants or canvas)")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = match args.settings {
        Some(ref path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .with_context(|| {
        let path = args.settings.clone().unwrap_or_else(settings_path);
        format!("Failed to load settings from {}", path.display())
    })?;
    args.apply(&mut settings);

    init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics = framecast_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = FramecastServer::new(settings)
        .context("Invalid settings")?
        .with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        name = NAME,
        version = VERSION,
        pattern = ?server.settings().session.pattern,
        "framecast listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let _ = server.shutdown(handle).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
