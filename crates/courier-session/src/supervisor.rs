//! Connection supervision: owns one logical session and re-establishes
//! it on every fatal disconnect.
//!
//! State machine: Disconnected -> Connecting -> Open -> Disconnected,
//! looping. Every close triggers the same unconditional reconnect; the
//! structured disconnect reason is logged, never branched on. Each
//! reconnect builds a brand-new session from freshly loaded auth state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use courier_core::credentials::AuthStateStore;
use courier_core::engine::{BrowserIdentity, Session, SessionConfig, SessionEngine};
use courier_core::errors::SupervisorError;
use courier_core::events::{ConnectionState, DisconnectReason, InboundMessage, SessionEvent};

use crate::version::VersionCache;

const QR_FILE: &str = "qr.txt";

/// Reconnect policy. The default preserves the historical behavior:
/// unconditional, immediate, unbounded retry on every close.
#[derive(Clone, Debug, Default)]
pub struct ReconnectPolicy {
    /// Consecutive reconnect attempts allowed before giving up; the
    /// counter resets once a session reaches Open. None = unbounded.
    pub max_attempts: Option<u32>,
    /// Pause between attempts. None = immediate.
    pub delay: Option<Duration>,
}

/// Supervisor wiring derived from application configuration.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Directory for the out-of-band pairing artifact.
    pub qr_dir: PathBuf,
    /// True selects the engine-owned pairing-code flow and suppresses
    /// the QR artifact.
    pub code_mode: bool,
    pub browser: BrowserIdentity,
    pub sync_full_history: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            qr_dir: PathBuf::from("database/qr-code"),
            code_mode: false,
            browser: BrowserIdentity::default(),
            sync_full_history: false,
        }
    }
}

enum SessionExit {
    /// The engine reported a close; reconnect.
    Closed(Option<DisconnectReason>),
    /// The event stream ended without a close; orderly shutdown.
    EventsExhausted,
}

pub struct ConnectionSupervisor {
    engine: Arc<dyn SessionEngine>,
    auth_store: Arc<dyn AuthStateStore>,
    versions: Arc<VersionCache>,
    config: SupervisorConfig,
    policy: ReconnectPolicy,
    inbound_tx: mpsc::Sender<InboundMessage>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionSupervisor {
    pub fn new(
        engine: Arc<dyn SessionEngine>,
        auth_store: Arc<dyn AuthStateStore>,
        versions: Arc<VersionCache>,
        config: SupervisorConfig,
        policy: ReconnectPolicy,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            engine,
            auth_store,
            versions,
            config,
            policy,
            inbound_tx,
            state_tx,
        }
    }

    /// Observe connection-state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Drive the supervision loop until the engine shuts the session down
    /// cleanly, the reconnect budget is exhausted, or a connect-cycle
    /// failure (auth load, version fallback, session open) propagates.
    pub async fn run(&self) -> Result<(), SupervisorError> {
        let mut attempts: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);
            let session = self.connect().await?;
            info!(session = %session.id, "session opened");

            let exit = self.pump(session).await;
            let was_open = *self.state_tx.borrow() == ConnectionState::Open;
            self.set_state(ConnectionState::Disconnected);

            match exit {
                SessionExit::EventsExhausted => {
                    info!("session event stream ended, supervisor stopping");
                    return Ok(());
                }
                SessionExit::Closed(reason) => {
                    if was_open {
                        attempts = 0;
                    }
                    attempts += 1;

                    warn!(
                        reason = reason.map_or("unknown", |r| r.reason_kind()),
                        attempt = attempts,
                        "connection closed, reconnecting"
                    );

                    if let Some(max) = self.policy.max_attempts {
                        if attempts > max {
                            return Err(SupervisorError::RetriesExhausted { attempts });
                        }
                    }
                    if let Some(delay) = self.policy.delay {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// One connect cycle: restore auth state, resolve the protocol
    /// version, open a fresh session. Failures here are not recovered
    /// locally; they abort `run`.
    async fn connect(&self) -> Result<Session, SupervisorError> {
        let auth = self.auth_store.load().await?;
        let version = self.versions.get().await?;
        let session = self
            .engine
            .open(SessionConfig {
                version,
                auth,
                browser: self.config.browser.clone(),
                sync_full_history: self.config.sync_full_history,
            })
            .await?;
        Ok(session)
    }

    /// Consume session events until the session closes or its stream
    /// ends. The receiver is live from the moment the engine handed it
    /// over, so no event can be missed.
    async fn pump(&self, mut session: Session) -> SessionExit {
        let mut registered = session.registered;

        while let Some(event) = session.events.recv().await {
            match event {
                SessionEvent::CredentialsUpdated(creds) => {
                    registered = creds.registered;
                    if let Err(e) = self.auth_store.save(&creds).await {
                        warn!(error = %e, "failed to persist updated credentials");
                    }
                }
                SessionEvent::ConnectionUpdate { state, qr, reason } => {
                    if let Some(qr) = qr {
                        if !registered && !self.config.code_mode {
                            self.write_qr_artifact(&qr).await;
                        }
                    }
                    match state {
                        ConnectionState::Open => {
                            self.set_state(ConnectionState::Open);
                            info!("connected");
                        }
                        ConnectionState::Close => return SessionExit::Closed(reason),
                        ConnectionState::Connecting | ConnectionState::Disconnected => {}
                    }
                }
                SessionEvent::MessageReceived(msg) => {
                    if self.inbound_tx.send(msg).await.is_err() {
                        warn!("inbound consumer gone, dropping message");
                    }
                }
            }
        }

        SessionExit::EventsExhausted
    }

    /// Persist the raw QR payload for out-of-band pairing. Directory
    /// creation is idempotent; write failures are logged and non-fatal.
    async fn write_qr_artifact(&self, qr: &str) {
        if let Err(e) = tokio::fs::create_dir_all(&self.config.qr_dir).await {
            warn!(dir = %self.config.qr_dir.display(), error = %e, "failed to create qr directory");
            return;
        }

        let path = self.config.qr_dir.join(QR_FILE);
        match tokio::fs::write(&path, qr).await {
            Ok(()) => info!(path = %path.display(), "qr challenge written for out-of-band pairing"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write qr artifact"),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        // send_replace never fails; we hold our own receiver-less sender.
        let _ = self.state_tx.send_replace(state);
    }
}
