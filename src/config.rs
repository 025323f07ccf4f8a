use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "homewatch", version, about)]
pub struct Cli {
    /// Path to configuration file
    #[clap(long, default_value = "./homewatch.toml")]
    pub config: PathBuf,

    /// Override device base URL (ESP32-CAM)
    #[clap(long)]
    pub device_url: Option<String>,

    /// Override HTTP listen address
    #[clap(long)]
    pub listen_addr: Option<String>,

    /// Override SQLite database path
    #[clap(long)]
    pub db_path: Option<PathBuf>,

    /// Enable the physical buzzer on alerts
    #[clap(long)]
    pub enable_buzzer: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_device_url")]
    pub device_url: String,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Seconds between noise poll ticks.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    #[serde(default)]
    pub enable_buzzer: bool,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_device_url() -> String {
    "http://192.168.1.10".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("noise.db")
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "1234".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            device_url: default_device_url(),
            db_path: default_db_path(),
            poll_interval_secs: default_poll_interval(),
            enable_buzzer: false,
            username: default_username(),
            password: default_password(),
        }
    }
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        let config_content = fs::read_to_string(&cli.config)
            .with_context(|| format!("Failed to read config file: {:?}", cli.config))?;

        toml::from_str(&config_content).context("Failed to parse config file")?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(ref device_url) = cli.device_url {
        config.device_url = device_url.clone();
    }

    if let Some(ref listen_addr) = cli.listen_addr {
        config.listen_addr = listen_addr.clone();
    }

    if let Some(ref db_path) = cli.db_path {
        config.db_path = db_path.clone();
    }

    if cli.enable_buzzer {
        config.enable_buzzer = true;
    }

    Ok(config)
}
