//! Configuration system for Cairn.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CAIRN_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/cairn/config.toml
//!   3. ~/.config/cairn/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CairnConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub discovery: DiscoverySettings,
    pub policy: PolicyConfig,
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name announced in discovery handshakes.
    pub display_name: String,
    /// Optional avatar reference (URL or content address).
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port for the local HTTP API.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Deadline for a single outbound dial, milliseconds.
    pub connect_timeout_ms: u64,
    /// Total dial attempts per connect. 1 = no retry.
    pub connect_attempts: u32,
    /// Pause between dial attempts, milliseconds.
    pub connect_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// If true, accept every inbound connection (demo behavior).
    pub accept_all: bool,
    /// Peer ids to accept when `accept_all` is off.
    pub allowed_peers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Number of in-process demo peers spawned by cairnd.
    pub peers: u32,
    /// Artificial delay before the simulated path reports results, milliseconds.
    pub scan_delay_ms: u64,
}

impl DiscoverySettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for CairnConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            network: NetworkConfig::default(),
            discovery: DiscoverySettings::default(),
            policy: PolicyConfig::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            display_name: "Anonymous".to_string(),
            avatar: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { api_port: 7400 }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            connect_attempts: 1,
            connect_backoff_ms: 500,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            accept_all: true,
            allowed_peers: Vec::new(),
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            peers: 3,
            scan_delay_ms: 1_500,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("cairn")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CairnConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            CairnConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CAIRN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&CairnConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply CAIRN_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CAIRN_IDENTITY__DISPLAY_NAME") {
            self.identity.display_name = v;
        }
        if let Ok(v) = std::env::var("CAIRN_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
        if let Ok(v) = std::env::var("CAIRN_DISCOVERY__CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.discovery.connect_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("CAIRN_DISCOVERY__CONNECT_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.discovery.connect_attempts = n;
            }
        }
        if let Ok(v) = std::env::var("CAIRN_POLICY__ACCEPT_ALL") {
            self.policy.accept_all = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("CAIRN_SIMULATION__PEERS") {
            if let Ok(n) = v.parse() {
                self.simulation.peers = n;
            }
        }
    }
}
