use anyhow::Result;
use clap::{Parser, Subcommand};
use crewmind::commands;
use crewmind::config::Config;
use crewmind::events::Layout;
use crewmind::logging::{self, LogSink};
use crewmind::ui;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crewmind")]
#[command(version)]
#[command(about = "Terminal client for the Crewmind Assistant", long_about = None)]
struct Cli {
    /// Read settings from this file instead of ~/.crewmind/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend address, e.g. http://localhost:8000
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Front end to start the interactive client with
    #[arg(long, value_enum)]
    layout: Option<Layout>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the answer
    Ask { question: String },
    /// Print a page of past exchanges, newest first
    History {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        per_page: Option<u32>,
    },
    /// Print one stored exchange
    Show { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(base_url) = cli.base_url {
        config.set_base_url(base_url)?;
    }
    if let Some(layout) = cli.layout {
        config.layout = layout;
    }
    config.validate()?;

    match cli.command {
        None => {
            let log_path = config.log_path();
            logging::init(LogSink::File(&log_path))?;
            ui::run(&config).await
        }
        Some(command) => {
            logging::init(LogSink::Stderr)?;
            match command {
                Commands::Ask { question } => commands::ask(&config, &question).await,
                Commands::History { page, per_page } => {
                    commands::history(&config, page, per_page).await
                }
                Commands::Show { id } => commands::show(&config, &id).await,
            }
        }
    }
}
