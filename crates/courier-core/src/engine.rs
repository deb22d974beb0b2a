use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::credentials::AuthState;
use crate::errors::SessionError;
use crate::events::{OutboundMessage, SessionEvent};
use crate::ids::SessionId;

/// Opaque protocol version descriptor, e.g. `2.3000.1023`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(pub Vec<u32>);

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// Browser identity advertised to the remote during handshake.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrowserIdentity {
    pub os: String,
    pub client: String,
    pub release: String,
}

impl Default for BrowserIdentity {
    fn default() -> Self {
        Self {
            os: "Ubuntu".into(),
            client: "Chrome".into(),
            release: "20.0.04".into(),
        }
    }
}

/// Everything the session engine needs to establish one connection.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub version: ProtocolVersion,
    pub auth: AuthState,
    pub browser: BrowserIdentity,
    pub sync_full_history: bool,
}

/// One live connection attempt. Never reused: every reconnect constructs
/// a brand-new Session bound to freshly loaded auth state.
pub struct Session {
    pub id: SessionId,
    pub handle: Box<dyn SessionHandle>,
    pub events: mpsc::Receiver<SessionEvent>,
    /// Pairing status at open time, taken from the supplied credentials.
    pub registered: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

/// Outbound half of the narrow session interface.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    async fn send(&self, msg: OutboundMessage) -> Result<(), SessionError>;
}

/// The external protocol/session engine. Handshake, encryption and
/// credential refresh all live behind this seam.
#[async_trait]
pub trait SessionEngine: Send + Sync {
    async fn open(&self, config: SessionConfig) -> Result<Session, SessionError>;
}
