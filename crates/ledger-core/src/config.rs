use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from default path (~/.config/mood-ledger/config.toml),
    /// falling back to defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config
            .ledger
            .validate()
            .map_err(|e| LedgerError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Write current configuration to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mood-ledger")
            .join("config.toml")
    }
}

/// Window sizes and retention for the session ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Base window size. The retention cap defaults to twice this.
    pub window_size: usize,
    /// Hard ceiling on stored events per (session group, participant) bucket.
    pub retention_cap: Option<usize>,
    /// Number of most recent events a summary is computed over.
    pub summary_window: usize,
    /// Below this many events no summary is produced.
    pub min_summary_events: usize,
    /// Number of most recent events scanned for label transitions.
    pub transition_window: usize,
    /// Recent labels included in generation context.
    pub context_limit: usize,
    /// Events considered by the full label distribution.
    pub distribution_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            retention_cap: None,
            summary_window: 20,
            min_summary_events: 3,
            transition_window: 20,
            context_limit: 5,
            distribution_limit: 50,
        }
    }
}

impl LedgerConfig {
    /// Effective retention cap.
    pub fn retention_cap(&self) -> usize {
        self.retention_cap
            .unwrap_or_else(|| self.window_size.saturating_mul(2))
    }

    /// Reject zero-sized windows and caps.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("window_size", self.window_size),
            ("retention_cap", self.retention_cap()),
            ("summary_window", self.summary_window),
            ("min_summary_events", self.min_summary_events),
            ("transition_window", self.transition_window),
            ("context_limit", self.context_limit),
            ("distribution_limit", self.distribution_limit),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(LedgerError::invalid(format!("{} must be greater than zero", name)));
            }
        }
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Bearer token for authentication (None = no auth).
    pub auth_token: Option<String>,
    /// Enable CORS.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            auth_token: None,
            cors: true,
        }
    }
}
