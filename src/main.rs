use std::fs;
use std::path::Path;

use anyhow::Result;
use cert_triage::cli::commands;
use cert_triage::cli::flags::Cli;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;
    commands::run(cli).await
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let registry = tracing_subscriber::registry().with(filter).with(stdout_layer);

    match &cli.log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(false);
            registry.with(file_layer).try_init().ok();
        }
        None => {
            registry.try_init().ok();
        }
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        if let Ok(meta) = fs::metadata(path) {
            if meta.len() > 1_000_000 {
                let rotated = path.with_extension("log.1");
                let _ = fs::rename(path, rotated);
            }
        }
    }
    let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}
