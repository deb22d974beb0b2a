use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Application configuration, loaded once at startup from a JSON file.
/// Unknown keys are ignored; every field has a default so a minimal
/// `{}` config is valid.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// When true, pairing uses the engine-owned pairing-code flow and the
    /// QR artifact path is suppressed.
    pub code_mode: bool,
    /// Root under which `database/` artifacts live.
    pub app_root: PathBuf,
    /// Items dispatched together per micro-batch.
    pub messages_per_batch: usize,
    /// Defensive upper bound on concurrent in-flight processors.
    pub max_workers: usize,
    /// Tuning knob carried for parity with the queue constructor;
    /// not independently enforced.
    pub batch_size: usize,
    /// Ask the engine to replay full history on pairing.
    pub sync_full_history: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            code_mode: false,
            app_root: PathBuf::from("."),
            messages_per_batch: 2,
            max_workers: 8,
            batch_size: 10,
            sync_full_history: false,
        }
    }
}

impl AppConfig {
    /// Load and parse the config file. Failures here are startup-fatal;
    /// the binary logs and exits non-zero.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn auth_dir(&self) -> PathBuf {
        self.app_root.join("database").join("auth")
    }

    pub fn qr_dir(&self) -> PathBuf {
        self.app_root.join("database").join("qr-code")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
