//! File-backed credential persistence.
//!
//! One directory per account: `creds.json` holds the credential set,
//! `keys.json` the opaque signal-style key records. A directory with no
//! `creds.json` yields fresh unregistered state (new pairing).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use courier_core::credentials::{AuthState, AuthStateStore, Credentials, KeyStore};
use courier_core::errors::AuthError;

const CREDS_FILE: &str = "creds.json";
const KEYS_FILE: &str = "keys.json";

pub struct FileAuthStore {
    dir: PathBuf,
}

impl FileAuthStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn creds_path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }

    fn keys_path(&self) -> PathBuf {
        self.dir.join(KEYS_FILE)
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> AuthError + '_ {
        move |source| AuthError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl AuthStateStore for FileAuthStore {
    async fn load(&self) -> Result<AuthState, AuthError> {
        let creds_path = self.creds_path();

        let creds = match tokio::fs::read_to_string(&creds_path).await {
            Ok(content) => {
                serde_json::from_str::<Credentials>(&content).map_err(|e| AuthError::Corrupt {
                    path: creds_path.clone(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Credentials::unregistered(
                format!("nk_{}", Uuid::now_v7()),
                format!("ik_{}", Uuid::now_v7()),
            ),
            Err(e) => return Err(AuthError::Io { path: creds_path, source: e }),
        };

        let keys_path = self.keys_path();
        let keys: KeyStore = match tokio::fs::read_to_string(&keys_path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| AuthError::Corrupt {
                path: keys_path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => KeyStore::new(),
            Err(e) => return Err(AuthError::Io { path: keys_path, source: e }),
        };

        Ok(AuthState { creds, keys })
    }

    async fn save(&self, creds: &Credentials) -> Result<(), AuthError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(Self::io_err(&self.dir))?;

        let json = serde_json::to_string_pretty(creds).map_err(|e| AuthError::Corrupt {
            path: self.creds_path(),
            reason: e.to_string(),
        })?;

        let path = self.creds_path();
        tokio::fs::write(&path, json)
            .await
            .map_err(Self::io_err(&path))
    }
}
