use crate::events::Layout;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default backend address, matching the development server
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Largest page the history endpoint accepts
pub const MAX_PAGE_SIZE: u32 = 100;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the assistant API, without the `/api/v1` suffix
    pub base_url: String,

    /// Which front end to show: single response or transcript
    pub layout: Layout,

    /// Overrides the per-layout history page size
    pub history_page_size: Option<u32>,

    /// Per-request timeout; no timeout when unset
    pub request_timeout_secs: Option<u64>,

    /// Where the TUI writes its diagnostic log
    pub log_file: Option<PathBuf>,

    /// Crewmind home directory
    #[serde(skip)]
    pub crewmind_home: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        Config {
            base_url: DEFAULT_BASE_URL.to_string(),
            layout: Layout::default(),
            history_page_size: None,
            request_timeout_secs: None,
            log_file: None,
            crewmind_home: home.join(".crewmind"),
        }
    }
}

impl Config {
    /// Load `~/.crewmind/config.toml`, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        let crewmind_home = home.join(".crewmind");

        fs::create_dir_all(&crewmind_home)
            .context("Failed to create .crewmind directory")?;

        let mut config = Self::load_from(&crewmind_home.join("config.toml"))?;
        config.crewmind_home = crewmind_home;
        Ok(config)
    }

    /// Load a specific config file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject a base URL reqwest could never reach
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base_url '{}'", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("base_url must use http or https, got '{}'", url.scheme());
        }
        Ok(())
    }

    /// Override the base URL (from the command line)
    pub fn set_base_url(&mut self, base_url: String) -> Result<()> {
        self.base_url = base_url;
        self.validate()
    }

    /// Base URL with any trailing slash removed
    pub fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// History page size for a layout, honouring the override
    pub fn page_size_for(&self, layout: Layout) -> u32 {
        self.history_page_size
            .unwrap_or_else(|| layout.default_page_size())
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Log file path, defaulting to `~/.crewmind/crewmind.log`
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.crewmind_home.join("crewmind.log"))
    }
}
