//! In-process session engine for development and tests.
//!
//! Each `open()` call replays the next pre-programmed event script into
//! the session's event channel, in order. Scripts are consumed
//! sequentially; an open beyond the last script fails.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use courier_core::engine::{Session, SessionConfig, SessionEngine, SessionHandle};
use courier_core::errors::SessionError;
use courier_core::events::{OutboundMessage, SessionEvent};
use courier_core::ids::SessionId;

pub struct LoopbackEngine {
    scripts: Mutex<VecDeque<Vec<SessionEvent>>>,
    open_calls: AtomicUsize,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    /// Keep the event channel open after the script is exhausted, so the
    /// session idles instead of ending (development mode).
    hold_open: bool,
}

impl LoopbackEngine {
    pub fn new(scripts: Vec<Vec<SessionEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            open_calls: AtomicUsize::new(0),
            sent: Arc::new(Mutex::new(Vec::new())),
            hold_open: false,
        }
    }

    /// Development variant: sessions idle forever after their script.
    pub fn holding_open(scripts: Vec<Vec<SessionEvent>>) -> Self {
        Self {
            hold_open: true,
            ..Self::new(scripts)
        }
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::Relaxed)
    }

    /// Outbound messages accepted across all sessions, in send order.
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }
}

struct LoopbackHandle {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

#[async_trait]
impl SessionHandle for LoopbackHandle {
    async fn send(&self, msg: OutboundMessage) -> Result<(), SessionError> {
        self.sent.lock().push(msg);
        Ok(())
    }
}

#[async_trait]
impl SessionEngine for LoopbackEngine {
    async fn open(&self, config: SessionConfig) -> Result<Session, SessionError> {
        let call = self.open_calls.fetch_add(1, Ordering::Relaxed);

        let script = self.scripts.lock().pop_front().ok_or_else(|| {
            SessionError::OpenFailed(format!("loopback: no script configured for open {call}"))
        })?;

        let (tx, rx) = mpsc::channel(32);
        let hold_open = self.hold_open;
        drop(tokio::spawn(async move {
            for event in script {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if hold_open {
                // Park with the sender alive so the channel never ends.
                std::future::pending::<()>().await;
            }
        }));

        Ok(Session {
            id: SessionId::new(),
            handle: Box::new(LoopbackHandle {
                sent: Arc::clone(&self.sent),
            }),
            events: rx,
            registered: config.auth.creds.registered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::credentials::{AuthState, Credentials, KeyStore};
    use courier_core::engine::{BrowserIdentity, ProtocolVersion};
    use courier_core::events::ConnectionState;

    fn config() -> SessionConfig {
        SessionConfig {
            version: ProtocolVersion(vec![2, 3000, 1]),
            auth: AuthState {
                creds: Credentials::unregistered("nk", "ik"),
                keys: KeyStore::new(),
            },
            browser: BrowserIdentity::default(),
            sync_full_history: false,
        }
    }

    #[tokio::test]
    async fn replays_script_in_order() {
        let engine = LoopbackEngine::new(vec![vec![
            SessionEvent::qr("2@pair-me"),
            SessionEvent::state(ConnectionState::Open),
        ]]);

        let mut session = engine.open(config()).await.unwrap();
        let first = session.events.recv().await.unwrap();
        assert_eq!(first.event_type(), "connection_update");
        let second = session.events.recv().await.unwrap();
        assert!(matches!(
            second,
            SessionEvent::ConnectionUpdate {
                state: ConnectionState::Open,
                ..
            }
        ));
        // Script exhausted, channel ends.
        assert!(session.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn counts_opens_and_fails_when_exhausted() {
        let engine = LoopbackEngine::new(vec![vec![]]);

        assert!(engine.open(config()).await.is_ok());
        assert_eq!(engine.open_calls(), 1);

        let err = engine.open(config()).await.unwrap_err();
        assert!(matches!(err, SessionError::OpenFailed(_)));
        assert_eq!(engine.open_calls(), 2);
    }

    #[tokio::test]
    async fn handle_records_outbound_messages() {
        let engine = LoopbackEngine::new(vec![vec![]]);
        let session = engine.open(config()).await.unwrap();

        session
            .handle
            .send(OutboundMessage {
                to: "1555@s.net".into(),
                text: "hello".into(),
            })
            .await
            .unwrap();

        let sent = engine.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "hello");
    }

    #[tokio::test]
    async fn registered_flag_mirrors_supplied_credentials() {
        let engine = LoopbackEngine::new(vec![vec![], vec![]]);

        let session = engine.open(config()).await.unwrap();
        assert!(!session.registered);

        let mut cfg = config();
        cfg.auth.creds.registered = true;
        let session = engine.open(cfg).await.unwrap();
        assert!(session.registered);
    }
}
