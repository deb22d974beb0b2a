use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;

/// Connection lifecycle as observed by the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Close,
}

/// Structured disconnect reason extracted from the transport error.
///
/// Diagnostic only: the supervisor reconnects unconditionally and never
/// branches on the reason code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    LoggedOut,
    ConnectionClosed,
    ConnectionLost,
    ConnectionReplaced,
    RestartRequired,
    TimedOut,
    Unknown,
}

impl DisconnectReason {
    /// Classify a transport status code into the appropriate reason.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::LoggedOut,
            408 => Self::ConnectionLost,
            428 => Self::ConnectionClosed,
            440 => Self::ConnectionReplaced,
            515 => Self::RestartRequired,
            504 => Self::TimedOut,
            _ => Self::Unknown,
        }
    }

    /// Short classification string for logging.
    pub fn reason_kind(&self) -> &'static str {
        match self {
            Self::LoggedOut => "logged_out",
            Self::ConnectionClosed => "connection_closed",
            Self::ConnectionLost => "connection_lost",
            Self::ConnectionReplaced => "connection_replaced",
            Self::RestartRequired => "restart_required",
            Self::TimedOut => "timed_out",
            Self::Unknown => "unknown",
        }
    }
}

/// Inbound message surfaced by the session engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub text: String,
}

/// Outbound message handed to the session engine for delivery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub text: String,
}

/// Events emitted by one live session, consumed by the supervisor.
/// Subscription is implicit: the engine hands over the receiver at open
/// time, before it emits anything, so no event can be missed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    #[serde(rename = "credentials_updated")]
    CredentialsUpdated(Credentials),

    #[serde(rename = "connection_update")]
    ConnectionUpdate {
        state: ConnectionState,
        /// Raw QR challenge payload, present while pairing is pending.
        #[serde(skip_serializing_if = "Option::is_none")]
        qr: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<DisconnectReason>,
    },

    #[serde(rename = "message_received")]
    MessageReceived(InboundMessage),
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CredentialsUpdated(_) => "credentials_updated",
            Self::ConnectionUpdate { .. } => "connection_update",
            Self::MessageReceived(_) => "message_received",
        }
    }

    /// Convenience constructor for a plain state transition.
    pub fn state(state: ConnectionState) -> Self {
        Self::ConnectionUpdate {
            state,
            qr: None,
            reason: None,
        }
    }

    /// Convenience constructor for a QR challenge while connecting.
    pub fn qr(payload: impl Into<String>) -> Self {
        Self::ConnectionUpdate {
            state: ConnectionState::Connecting,
            qr: Some(payload.into()),
            reason: None,
        }
    }

    /// Convenience constructor for a close with a structured reason.
    pub fn close(reason: DisconnectReason) -> Self {
        Self::ConnectionUpdate {
            state: ConnectionState::Close,
            qr: None,
            reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_reason_from_status() {
        assert_eq!(DisconnectReason::from_status(401), DisconnectReason::LoggedOut);
        assert_eq!(DisconnectReason::from_status(428), DisconnectReason::ConnectionClosed);
        assert_eq!(DisconnectReason::from_status(515), DisconnectReason::RestartRequired);
        assert_eq!(DisconnectReason::from_status(999), DisconnectReason::Unknown);
    }

    #[test]
    fn reason_kind_strings() {
        assert_eq!(DisconnectReason::LoggedOut.reason_kind(), "logged_out");
        assert_eq!(DisconnectReason::Unknown.reason_kind(), "unknown");
    }

    #[test]
    fn event_type_str() {
        assert_eq!(SessionEvent::state(ConnectionState::Open).event_type(), "connection_update");
        assert_eq!(
            SessionEvent::MessageReceived(InboundMessage {
                from: "a".into(),
                text: "hi".into(),
            })
            .event_type(),
            "message_received"
        );
    }

    #[test]
    fn qr_event_carries_payload() {
        let evt = SessionEvent::qr("2@abc,def");
        match evt {
            SessionEvent::ConnectionUpdate { state, qr, reason } => {
                assert_eq!(state, ConnectionState::Connecting);
                assert_eq!(qr.as_deref(), Some("2@abc,def"));
                assert!(reason.is_none());
            }
            other => panic!("expected ConnectionUpdate, got {other:?}"),
        }
    }

    #[test]
    fn session_event_serde_roundtrip() {
        let events = vec![
            SessionEvent::state(ConnectionState::Open),
            SessionEvent::qr("2@payload"),
            SessionEvent::close(DisconnectReason::ConnectionLost),
        ];

        for evt in &events {
            let json = serde_json::to_string(evt).unwrap();
            let parsed: SessionEvent = serde_json::from_str(&json).unwrap();
            let json2 = serde_json::to_string(&parsed).unwrap();
            assert_eq!(json, json2);
        }
    }
}
