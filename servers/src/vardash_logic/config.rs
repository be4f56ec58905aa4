use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Runtime variables dashboard server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(short = 'p', long, env = "VARDASH_PORT", help = "Dashboard HTTP port.")]
    pub port: Option<u16>,

    #[clap(short = 'd', long, env = "VARDASH_DASHBOARD", help = "Path to the dashboard configuration file.")]
    pub dashboard: Option<PathBuf>,

    #[clap(long, env = "VARDASH_CONFIG_PATH", help = "Path to the JSON server settings file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "VARDASH_INTERVAL_MS", help = "Milliseconds between two poll cycles.")]
    pub interval_ms: Option<u64>,

    #[clap(long, env = "VARDASH_CYCLE_DEADLINE_MS", help = "Milliseconds a poll cycle waits for its services.")]
    pub cycle_deadline_ms: Option<u64>,

    #[clap(long, env = "VARDASH_FETCH_TIMEOUT_MS", help = "Per-request timeout in milliseconds.")]
    pub fetch_timeout_ms: Option<u64>,

    #[clap(long, env = "VARDASH_SUBSCRIBER_QUEUE", help = "Frames buffered per viewer before it is dropped.")]
    pub subscriber_queue: Option<usize>,

    #[clap(long, env = "VARDASH_STATIC_DIR", help = "Directory served under /static.")]
    pub static_dir: Option<PathBuf>,

    #[clap(long, env = "VARDASH_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "VARDASH_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

/// Fully resolved settings, every value present.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub dashboard: PathBuf,
    pub interval: Duration,
    pub cycle_deadline: Duration,
    pub fetch_timeout: Duration,
    pub subscriber_queue: usize,
    pub static_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Config {
    fn defaults() -> Config {
        Config {
            port: Some(4444),
            interval_ms: Some(1000),
            cycle_deadline_ms: Some(1000),
            fetch_timeout_ms: Some(800),
            subscriber_queue: Some(10),
            static_dir: Some(PathBuf::from("./static")),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            dashboard: other.dashboard.or(self.dashboard),
            config_path: other.config_path.or(self.config_path),
            interval_ms: other.interval_ms.or(self.interval_ms),
            cycle_deadline_ms: other.cycle_deadline_ms.or(self.cycle_deadline_ms),
            fetch_timeout_ms: other.fetch_timeout_ms.or(self.fetch_timeout_ms),
            subscriber_queue: other.subscriber_queue.or(self.subscriber_queue),
            static_dir: other.static_dir.or(self.static_dir),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    fn resolve(self) -> Result<Settings> {
        let defaults = Config::defaults();
        let c = defaults.merge(self);

        let dashboard = c
            .dashboard
            .context("no dashboard configuration given (use -d/--dashboard or VARDASH_DASHBOARD)")?;
        let interval_ms = c.interval_ms.unwrap_or(1000);
        if interval_ms == 0 {
            anyhow::bail!("poll interval must be greater than zero");
        }
        let cycle_deadline_ms = c.cycle_deadline_ms.unwrap_or(1000);
        let fetch_timeout_ms = c.fetch_timeout_ms.unwrap_or(800);

        Ok(Settings {
            port: c.port.unwrap_or(4444),
            dashboard,
            interval: Duration::from_millis(interval_ms),
            cycle_deadline: Duration::from_millis(cycle_deadline_ms),
            fetch_timeout: Duration::from_millis(fetch_timeout_ms),
            subscriber_queue: c.subscriber_queue.unwrap_or(10),
            static_dir: c.static_dir.unwrap_or_else(|| PathBuf::from("./static")),
            log_dir: c.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: c.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn read_file_config(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults, the optional settings file, then environment variables and CLI flags.
pub fn load_config() -> Result<Settings> {
    let cli = Config::parse();
    layer(cli)
}

fn layer(cli: Config) -> Result<Settings> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_vardash.conf"));

    let mut current = Config::default();
    if let Some(file_config) = read_file_config(&config_file_path) {
        current = current.merge(file_config);
    }
    current.merge(cli).resolve()
}
