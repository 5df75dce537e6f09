//! Configuration management for ticketd.
//!
//! Loads daemon settings from /etc/ticketd/ticketd.toml or uses defaults.
//! Ticket categories, roles and channels live in the separate JSON ticket
//! configuration at `config_path`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/ticketd/ticketd.toml";

/// Environment variable overriding the config file path
pub const CONFIG_ENV: &str = "TICKETD_CONFIG";

pub use ticket_common::ipc::DEFAULT_SOCKET_PATH;

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/var/lib/ticketd/config.json")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/ticketd/state")
}

fn default_transcripts_dir() -> PathBuf {
    PathBuf::from("/var/lib/ticketd/transcripts")
}

fn default_transcript_max_age_days() -> u64 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket ticketctl connects to
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Ticket configuration store (categories, roles, channels, settings)
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Directory holding the durable ticket index
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_transcripts_dir")]
    pub transcripts_dir: PathBuf,

    /// Exported transcripts older than this are deleted at startup
    #[serde(default = "default_transcript_max_age_days")]
    pub transcript_max_age_days: u64,

    /// Used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            config_path: default_config_path(),
            state_dir: default_state_dir(),
            transcripts_dir: default_transcripts_dir(),
            transcript_max_age_days: default_transcript_max_age_days(),
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load config: explicit path, then $TICKETD_CONFIG, then the system
    /// path. An explicit path that cannot be read is an error; otherwise
    /// a missing file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_PATH));

        Ok(Self::load_from_path(&path).unwrap_or_else(|e| {
            warn!("Config not found, using defaults: {:#}", e);
            DaemonConfig::default()
        }))
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn transcript_max_age(&self) -> Duration {
        Duration::from_secs(self.transcript_max_age_days * 24 * 60 * 60)
    }

    /// Move every path under `root` (sandbox runs)
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.socket_path = root.join("ticketd.sock");
        self.config_path = root.join("config.json");
        self.state_dir = root.join("state");
        self.transcripts_dir = root.join("transcripts");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/run/ticketd/ticketd.sock"));
        assert_eq!(config.transcript_max_age_days, 7);
        assert_eq!(config.transcript_max_age(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
socket_path = "/tmp/t.sock"
transcript_max_age_days = 30
"#;
        let config: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/t.sock"));
        assert_eq!(config.transcript_max_age_days, 30);
        // Defaults for missing fields
        assert_eq!(config.log_level, "info");
        assert_eq!(config.config_path, default_config_path());
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let dir = tempdir().unwrap();
        assert!(DaemonConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_explicit_path_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ticketd.toml");
        fs::write(&path, "log_level = \"debug\"\n").unwrap();
        let config = DaemonConfig::load(Some(&path)).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_rooted_at() {
        let config = DaemonConfig::default().rooted_at(Path::new("/tmp/sb"));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/sb/state"));
        assert_eq!(config.socket_path, PathBuf::from("/tmp/sb/ticketd.sock"));
    }
}
