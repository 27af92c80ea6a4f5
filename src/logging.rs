use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn,crewmind=info";

/// Where diagnostic output goes
#[derive(Debug, Clone, Copy)]
pub enum LogSink<'a> {
    /// One-shot CLI commands
    Stderr,
    /// The TUI owns the terminal, so it logs to a file
    File(&'a Path),
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber (`RUST_LOG` overrides the default filter)
pub fn init(sink: LogSink<'_>) -> Result<()> {
    match sink {
        LogSink::Stderr => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact();

            tracing_subscriber::registry()
                .with(filter())
                .with(fmt_layer)
                .try_init()
                .context("Failed to install log subscriber")?;
        }
        LogSink::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create log directory")?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file));

            tracing_subscriber::registry()
                .with(filter())
                .with(fmt_layer)
                .try_init()
                .context("Failed to install log subscriber")?;
        }
    }

    Ok(())
}
