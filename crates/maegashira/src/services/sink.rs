//! Post-transaction sink: every request's Transaction record is enqueued
//! in-process and drained to a Redis-backed durable queue by a background
//! task.
//!
//! Delivery is at-least-once and the in-process queue is unbounded: a
//! record accepted from a request handler is never discarded, it waits in
//! memory until the drain task lands it. Backpressure is made observable
//! instead, through a queue-depth gauge and high-water warnings. A record
//! that fails to reach Redis is retried on the same connection-recovery
//! loop until it lands. Without a Redis configuration the sink degrades to
//! logging records, which keeps the "one record per request" contract
//! observable in development.

use crate::config::settings::RedisSettings;
use crate::models::transaction::Transaction;
use log::{debug, error, warn};
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Redis list the records are pushed onto.
pub const QUEUE_KEY: &str = "maegashira:transactions";

/// Queue depth at which (and at every multiple of which) a warning is
/// logged; the queue keeps accepting records regardless.
const WARN_DEPTH: u64 = 1024;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Reconnect backoff: `clamp(exp(attempt) ms, 1000ms, 20000ms)`.
pub fn reconnect_backoff(attempt: u32) -> Duration {
    let millis = (attempt as f64).exp() as u64;
    Duration::from_millis(millis.clamp(1000, 20_000))
}

/// Cheap cloneable handle used by request handlers to enqueue records.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::UnboundedSender<Transaction>,
    depth: Arc<AtomicU64>,
}

impl SinkHandle {
    /// Enqueues one record; never blocks the request path and never drops.
    ///
    /// The send only fails once the drain task has shut down, which is
    /// logged so late records are still accounted for.
    pub fn enqueue(&self, transaction: &Transaction) {
        if self.tx.send(transaction.clone()).is_err() {
            error!(
                "transaction sink is shut down, record {} not delivered",
                transaction.id
            );
            return;
        }
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if depth >= WARN_DEPTH && depth % WARN_DEPTH == 0 {
            warn!("transaction sink backlog at {depth} record(s); drain is falling behind");
        }
    }

    /// Undelivered records currently queued (including the one in flight).
    pub fn depth(&self) -> u64 {
        self.depth.load(Ordering::Relaxed)
    }
}

/// The sink's background half, owned by the primary controller.
pub struct TransactionSink {
    handle: SinkHandle,
    depth: Arc<AtomicU64>,
    drain: JoinHandle<()>,
}

impl TransactionSink {
    /// Spawns the drain task. `redis` of `None` selects the log-only
    /// fallback.
    pub fn spawn(redis: Option<RedisSettings>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicU64::new(0));
        let drain = tokio::spawn(drain_queue(rx, redis, Arc::clone(&depth)));
        Self {
            handle: SinkHandle {
                tx,
                depth: Arc::clone(&depth),
            },
            depth,
            drain,
        }
    }

    pub fn handle(&self) -> SinkHandle {
        self.handle.clone()
    }

    /// Shared gauge of undelivered records, for the metrics exposition.
    pub fn queue_depth_gauge(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.depth)
    }

    /// Closes the queue and waits for the drain task to flush what it can.
    pub async fn shutdown(self) {
        let TransactionSink { handle, depth, drain } = self;
        drop(handle);
        if tokio::time::timeout(FLUSH_TIMEOUT, drain).await.is_err() {
            warn!(
                "transaction sink did not flush within {FLUSH_TIMEOUT:?}, {} record(s) left",
                depth.load(Ordering::Relaxed)
            );
        }
    }
}

async fn drain_queue(
    mut rx: mpsc::UnboundedReceiver<Transaction>,
    redis: Option<RedisSettings>,
    depth: Arc<AtomicU64>,
) {
    let mut connection: Option<redis::aio::MultiplexedConnection> = None;

    while let Some(transaction) = rx.recv().await {
        match serde_json::to_string(&transaction) {
            Ok(payload) => match &redis {
                None => debug!("transaction recorded: {payload}"),
                Some(settings) => deliver(settings, &mut connection, &payload).await,
            },
            Err(e) => {
                error!("transaction {} is not serializable: {e}", transaction.id);
            }
        }
        depth.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Pushes one record, reconnecting with exponential backoff until it lands.
async fn deliver(
    settings: &RedisSettings,
    connection: &mut Option<redis::aio::MultiplexedConnection>,
    payload: &str,
) {
    let mut attempt: u32 = 0;
    loop {
        if connection.is_none() {
            match connect(settings).await {
                Ok(fresh) => *connection = Some(fresh),
                Err(e) => {
                    attempt += 1;
                    let backoff = reconnect_backoff(attempt);
                    warn!("transaction sink cannot reach redis (attempt {attempt}): {e}; retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            }
        }

        let Some(conn) = connection.as_mut() else {
            continue;
        };

        let pushed: redis::RedisResult<i64> = conn.lpush(QUEUE_KEY, payload).await;
        match pushed {
            Ok(_) => return,
            Err(e) => {
                attempt += 1;
                let backoff = reconnect_backoff(attempt);
                warn!("transaction sink push failed (attempt {attempt}): {e}; retrying in {backoff:?}");
                *connection = None;
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn connect(
    settings: &RedisSettings,
) -> redis::RedisResult<redis::aio::MultiplexedConnection> {
    let client = redis::Client::open(settings.url())?;
    client.get_multiplexed_async_connection().await
}
