pub mod config;
pub mod credentials;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ids;

pub use config::{AppConfig, ConfigError};
pub use credentials::{AuthState, AuthStateStore, Credentials, KeyStore};
pub use engine::{BrowserIdentity, ProtocolVersion, Session, SessionConfig, SessionEngine, SessionHandle};
pub use errors::{AuthError, SessionError, SupervisorError, VersionError};
pub use events::{ConnectionState, DisconnectReason, InboundMessage, OutboundMessage, SessionEvent};
pub use ids::SessionId;
