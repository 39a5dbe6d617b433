//! Server configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind: String,
    pub port: u16,
    /// CSV file holding every user's cards and their scheduling state.
    pub cards_file: PathBuf,
    /// Directory (or file) with lesson vocabulary CSVs.
    pub lessons_dir: PathBuf,
    /// Maximum number of cards returned by a listing.
    pub list_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
            cards_file: PathBuf::from("cards.csv"),
            lessons_dir: PathBuf::from("lessons"),
            list_limit: 50,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lugat")
            .join("config.toml")
    }

    /// Loads `path` if given. Otherwise the default location is tried and a
    /// missing file there yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        anyhow::ensure!(config.list_limit > 0, "list_limit must be positive");
        Ok(config)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
