use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::AuthError;

/// Credential set binding one logical session to the remote account.
///
/// Key material never leaves the process unredacted except through the
/// auth-state store's save path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(serialize_with = "expose")]
    pub noise_key: SecretString,
    #[serde(serialize_with = "expose")]
    pub identity_key: SecretString,
    /// True once the account has completed QR/code pairing.
    #[serde(default)]
    pub registered: bool,
    /// Account identifier assigned by the remote, once paired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub me: Option<String>,
}

fn expose<S: Serializer>(secret: &SecretString, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(secret.expose_secret())
}

impl Credentials {
    /// Fresh unpaired credentials for a brand-new auth directory.
    pub fn unregistered(noise_key: impl Into<String>, identity_key: impl Into<String>) -> Self {
        Self {
            noise_key: SecretString::from(noise_key.into()),
            identity_key: SecretString::from(identity_key.into()),
            registered: false,
            me: None,
        }
    }
}

/// Opaque signal-style key records, keyed by `<type>:<id>`. The session
/// engine owns the contents; we only persist and restore them.
pub type KeyStore = HashMap<String, String>;

/// Persisted auth state restored at every connect cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthState {
    pub creds: Credentials,
    #[serde(default)]
    pub keys: KeyStore,
}

/// External credential persistence. Loaded once per connect cycle, saved
/// on every credential-update event from the session engine.
#[async_trait]
pub trait AuthStateStore: Send + Sync {
    async fn load(&self) -> Result<AuthState, AuthError>;
    async fn save(&self, creds: &Credentials) -> Result<(), AuthError>;
}
