//! In-memory micro-batch processing queue.
//!
//! Work is admitted FIFO into an unbounded pending buffer and drained in
//! fixed-size micro-batches. Items within a micro-batch run concurrently;
//! the drain loop waits for the whole batch to settle before pulling the
//! next one, so dispatch across batches is strictly sequential. Each item
//! gets a single-assignment completion that settles exactly once.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Boxed error type accepted from processors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Future returned by an item's processor.
pub type ProcessorFuture<R> = Pin<Box<dyn Future<Output = Result<R, BoxError>> + Send>>;

type BoxProcessor<T, R> = Box<dyn FnOnce(T) -> ProcessorFuture<R> + Send>;

/// Queue tuning knobs. `messages_per_batch` is the authoritative
/// parallelism bound; `max_workers` is a defensive upper cap on in-flight
/// processors and `batch_size` is carried for tuning parity only.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub max_workers: usize,
    pub batch_size: usize,
    pub messages_per_batch: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            batch_size: 10,
            messages_per_batch: 2,
        }
    }
}

/// Per-item failure modes observed through a [`Completion`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("processor failed: {0}")]
    Processor(String),
    #[error("queue dropped before the item was processed")]
    Dropped,
}

/// Monitoring counters, incremented as items settle.
#[derive(Clone, Copy, Debug)]
pub struct QueueStats {
    pub total_processed: u64,
    pub total_errors: u64,
    pub started_at: Instant,
}

/// Pending unit of work: payload, its processor, and the single-assignment
/// completion cell. Owned exclusively by the queue until dispatched.
struct QueueItem<T, R> {
    payload: T,
    processor: BoxProcessor<T, R>,
    completion: oneshot::Sender<Result<R, QueueError>>,
}

struct Inner<T, R> {
    pending: Mutex<VecDeque<QueueItem<T, R>>>,
    /// Mutual-exclusion flag for the drain loop, not a counter: at most
    /// one drain loop runs per queue instance.
    is_processing: AtomicBool,
    config: QueueConfig,
    total_processed: AtomicU64,
    total_errors: AtomicU64,
    started_at: Instant,
}

/// Handle to the queue. Cheap to clone; all clones share the same pending
/// buffer and drain loop.
pub struct BatchQueue<T, R> {
    inner: Arc<Inner<T, R>>,
}

impl<T, R> Clone for BatchQueue<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static, R: Send + 'static> BatchQueue<T, R> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(VecDeque::new()),
                is_processing: AtomicBool::new(false),
                config,
                total_processed: AtomicU64::new(0),
                total_errors: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(QueueConfig::default())
    }

    /// Append an item to the tail of the pending buffer and make sure a
    /// drain loop is running. The returned [`Completion`] settles exactly
    /// once, when the item's processor settles.
    ///
    /// No capacity limit: admission never blocks and never rejects.
    pub fn enqueue<P>(&self, payload: T, processor: P) -> Completion<R>
    where
        P: FnOnce(T) -> ProcessorFuture<R> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().push_back(QueueItem {
            payload,
            processor: Box::new(processor),
            completion: tx,
        });
        self.start_processing();
        Completion { rx }
    }

    /// Snapshot of the monitoring counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            total_processed: self.inner.total_processed.load(Ordering::Relaxed),
            total_errors: self.inner.total_errors.load(Ordering::Relaxed),
            started_at: self.inner.started_at,
        }
    }

    /// Number of items waiting for dispatch.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    fn start_processing(&self) {
        if self
            .inner
            .is_processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            drop(tokio::spawn(drain(inner)));
        }
    }
}

/// Drain loop. Pulls a contiguous head prefix of `messages_per_batch`
/// items, runs the micro-batch to full settlement, repeats until the
/// pending buffer is empty, then clears the flag and exits.
async fn drain<T: Send + 'static, R: Send + 'static>(inner: Arc<Inner<T, R>>) {
    loop {
        loop {
            let batch = next_batch(&inner);
            if batch.is_empty() {
                break;
            }

            debug!(batch_len = batch.len(), "dispatching micro-batch");

            // Concurrency within the batch is min(messages_per_batch,
            // remaining items); max_workers caps in-flight as a defensive
            // upper bound. One item's failure never aborts its siblings.
            let cap = inner.config.max_workers.max(1);
            stream::iter(batch.into_iter().map(|item| run_item(item, &inner)))
                .buffer_unordered(cap)
                .collect::<Vec<()>>()
                .await;
        }

        inner.is_processing.store(false, Ordering::Release);

        // An enqueue may have raced the loop exit. Re-arm only if we win
        // the flag back, otherwise that enqueue's own start took over.
        if inner.pending.lock().is_empty()
            || inner
                .is_processing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return;
        }
    }
}

fn next_batch<T, R>(inner: &Inner<T, R>) -> Vec<QueueItem<T, R>> {
    let take = inner.config.messages_per_batch.max(1);
    let mut pending = inner.pending.lock();
    let n = take.min(pending.len());
    pending.drain(..n).collect()
}

async fn run_item<T, R>(item: QueueItem<T, R>, inner: &Inner<T, R>) {
    let QueueItem {
        payload,
        processor,
        completion,
    } = item;

    match (processor)(payload).await {
        Ok(value) => {
            inner.total_processed.fetch_add(1, Ordering::Relaxed);
            // The caller may have dropped its Completion; that is fine.
            let _ = completion.send(Ok(value));
        }
        Err(e) => {
            inner.total_errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "queue item processor failed");
            let _ = completion.send(Err(QueueError::Processor(e.to_string())));
        }
    }
}

/// Per-item completion future. Resolves with the processor's result, or
/// [`QueueError::Dropped`] if the queue was torn down before dispatch.
pub struct Completion<R> {
    rx: oneshot::Receiver<Result<R, QueueError>>,
}

impl<R> Future for Completion<R> {
    type Output = Result<R, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(QueueError::Dropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}
