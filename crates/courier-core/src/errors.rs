//! Typed error hierarchy for the supervision layer.
//!
//! Recovery happens as close to the origin as possible: version-fetch
//! failures fall back inside the cache, QR-artifact writes are logged and
//! swallowed, per-item queue failures reject only their own completion.
//! Anything else propagates through these types to process startup.

use std::path::PathBuf;

/// Credential-store failures. Not caught by the supervisor; a failed
/// load aborts the connect cycle.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth state io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("auth state corrupt at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Session-engine failures surfaced through the `SessionEngine` seam.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session open failed: {0}")]
    OpenFailed(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not connected")]
    NotConnected,
}

/// Protocol-version lookup failures. Only `FallbackFailed` ever escapes
/// the cache; fetch and parse failures are recovered by the fallback
/// resolver.
#[derive(Clone, Debug, thiserror::Error)]
pub enum VersionError {
    #[error("version fetch failed: {0}")]
    Fetch(String),
    #[error("version document malformed: {0}")]
    Malformed(String),
    #[error("fallback version resolver failed: {0}")]
    FallbackFailed(String),
}

/// Top-level supervisor failure. Everything here is fatal to the
/// reconnect loop and expected to surface at process level.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("reconnect attempts exhausted after {attempts}")]
    RetriesExhausted { attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervisor_error_wraps_session_error() {
        let err: SupervisorError = SessionError::NotConnected.into();
        assert!(matches!(err, SupervisorError::Session(_)));
        assert_eq!(err.to_string(), "not connected");
    }

    #[test]
    fn supervisor_error_wraps_version_error() {
        let err: SupervisorError = VersionError::FallbackFailed("no pinned version".into()).into();
        assert!(matches!(err, SupervisorError::Version(_)));
    }

    #[test]
    fn retries_exhausted_message() {
        let err = SupervisorError::RetriesExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "reconnect attempts exhausted after 5");
    }

    #[test]
    fn auth_error_carries_path() {
        let err = AuthError::Corrupt {
            path: PathBuf::from("/tmp/creds.json"),
            reason: "truncated".into(),
        };
        assert!(err.to_string().contains("/tmp/creds.json"));
    }
}
