use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use courier_core::events::{ConnectionState, InboundMessage, SessionEvent};
use courier_core::AppConfig;
use courier_queue::{BatchQueue, QueueConfig};
use courier_session::supervisor::{ConnectionSupervisor, ReconnectPolicy, SupervisorConfig};
use courier_session::{FileAuthStore, HttpVersionFetcher, LoopbackEngine, PinnedResolver, VersionCache};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting courier");

    // Configuration load failure is startup-fatal.
    let config_path = std::env::var("COURIER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %config_path.display(), error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    // Inbound message handling: session events feed the channel, the
    // consumer throttles the work through the batch queue.
    let queue: BatchQueue<InboundMessage, ()> = BatchQueue::new(QueueConfig {
        max_workers: config.max_workers,
        batch_size: config.batch_size,
        messages_per_batch: config.messages_per_batch,
    });
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(1024);

    let consumer_queue = queue.clone();
    let _consumer = tokio::spawn(async move {
        while let Some(msg) = inbound_rx.recv().await {
            let completion = consumer_queue.enqueue(msg, |msg| {
                Box::pin(async move {
                    info!(from = %msg.from, "handling inbound message");
                    Ok(())
                })
            });
            // Per-item failures are already counted and logged by the queue.
            drop(tokio::spawn(completion));
        }
    });

    let versions = Arc::new(VersionCache::new(
        Arc::new(HttpVersionFetcher::new()),
        Arc::new(PinnedResolver),
    ));
    let auth_store = Arc::new(FileAuthStore::new(config.auth_dir()));

    // Development stand-in at the session-engine seam: pairs via a QR
    // challenge, connects, then idles until ctrl+c.
    let engine = Arc::new(LoopbackEngine::holding_open(vec![vec![
        SessionEvent::qr("2@loopback-dev-challenge"),
        SessionEvent::state(ConnectionState::Open),
        SessionEvent::MessageReceived(InboundMessage {
            from: "loopback".into(),
            text: "ping".into(),
        }),
    ]]));

    let supervisor = ConnectionSupervisor::new(
        engine,
        auth_store,
        versions,
        SupervisorConfig {
            qr_dir: config.qr_dir(),
            code_mode: config.code_mode,
            sync_full_history: config.sync_full_history,
            ..Default::default()
        },
        ReconnectPolicy::default(),
        inbound_tx,
    );

    tokio::select! {
        result = supervisor.run() => match result {
            Ok(()) => info!("supervisor finished"),
            Err(e) => {
                error!(error = %e, "supervisor failed");
                std::process::exit(1);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    let stats = queue.stats();
    info!(
        processed = stats.total_processed,
        errors = stats.total_errors,
        "queue totals at shutdown"
    );
}
