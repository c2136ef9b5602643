//! Routing-table store: the primary's authoritative snapshot and the
//! per-worker copies it feeds.
//!
//! Updates are validated before they become visible; readers only ever see
//! a complete snapshot, swapped in wholesale. Propagation to workers rides
//! a broadcast channel, totally ordered by the store's version counter.

use crate::config::validation::{validate_json, TableIssue};
use crate::models::error::ProxyError;
use crate::models::route::{Route, RoutingTable, Target};
use arc_swap::ArcSwap;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// One propagated routing-table update.
#[derive(Debug, Clone)]
pub struct TableUpdate {
    pub table: Arc<RoutingTable>,
    pub version: u64,
}

/// Authoritative, versioned routing-table snapshot owned by the primary.
pub struct RoutingTableStore {
    current: ArcSwap<RoutingTable>,
    version: AtomicU64,
    updates: broadcast::Sender<TableUpdate>,
}

impl Default for RoutingTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTableStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            current: ArcSwap::from_pointee(Vec::new()),
            version: AtomicU64::new(0),
            updates,
        }
    }

    /// Current snapshot; empty if the table was never set.
    pub fn get(&self) -> Arc<RoutingTable> {
        self.current.load_full()
    }

    /// Version of the current snapshot, `0` before the first `set`.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Validates the candidate and swaps it in atomically.
    ///
    /// On success the snapshot is broadcast to every subscribed worker and
    /// the forward hosts are submitted for DNS warming. On failure the
    /// current snapshot is left untouched.
    pub fn set(&self, candidate: RoutingTable) -> Result<u64, ProxyError> {
        let issues = self.validate(&candidate);
        if !issues.is_empty() {
            return Err(ProxyError::InvalidRoutingTable { issues });
        }

        let table = Arc::new(candidate);
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        self.current.store(Arc::clone(&table));

        // A send error only means no worker is subscribed yet.
        let _ = self.updates.send(TableUpdate {
            table: Arc::clone(&table),
            version,
        });

        info!("routing table replaced: {} route(s), version {}", table.len(), version);
        prefetch_dns(&table);
        Ok(version)
    }

    /// Structural validation of a typed candidate, mirroring the JSON-level
    /// checks so embedders calling `set` directly get the same guarantees.
    pub fn validate(&self, candidate: &[Route]) -> Vec<TableIssue> {
        match serde_json::to_value(candidate) {
            Ok(value) => validate_json(&value),
            Err(e) => vec![TableIssue {
                entry: None,
                field: String::new(),
                message: format!("routing table is not serializable: {e}"),
            }],
        }
    }

    /// Subscribes to table updates; the receiver sees them in total order.
    pub fn subscribe(&self) -> broadcast::Receiver<TableUpdate> {
        self.updates.subscribe()
    }
}

/// A worker's private copy of the routing table.
///
/// Readers load the snapshot wait-free; a background task applies broadcast
/// updates in order. Attachment fetches the current snapshot before
/// subscribing, so a worker (re)started mid-update never serves a stale
/// table.
pub struct WorkerTable {
    snapshot: ArcSwap<RoutingTable>,
    version: AtomicU64,
}

impl WorkerTable {
    /// Builds a worker copy fed by the store and spawns its update task
    /// when a runtime is available.
    pub fn attach(store: Arc<RoutingTableStore>) -> Arc<Self> {
        let worker = Arc::new(Self {
            snapshot: ArcSwap::new(store.get()),
            version: AtomicU64::new(store.version()),
        });

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let mut updates = store.subscribe();
            let worker_ref = Arc::clone(&worker);
            handle.spawn(async move {
                loop {
                    match updates.recv().await {
                        Ok(update) => worker_ref.apply(update),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("worker table lagged {missed} update(s), reloading current snapshot");
                            worker_ref.apply(TableUpdate {
                                table: store.get(),
                                version: store.version(),
                            });
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }

        worker
    }

    /// Current snapshot captured for the lifetime of one request.
    pub fn load(&self) -> Arc<RoutingTable> {
        self.snapshot.load_full()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn apply(&self, update: TableUpdate) {
        debug!("worker applying routing table version {}", update.version);
        self.snapshot.store(update.table);
        self.version.store(update.version, Ordering::Release);
    }
}

/// Warms the resolver cache for the unique set of forward hosts.
///
/// Best effort: failures are logged and ignored, and nothing happens
/// outside a runtime (e.g. in synchronous tests).
fn prefetch_dns(table: &RoutingTable) {
    let hosts: HashSet<String> = table
        .iter()
        .flat_map(|route| route.targets.iter())
        .filter_map(|target| match target {
            Target::Forward { url } => reqwest::Url::parse(url).ok().and_then(|u| {
                u.host_str()
                    .map(|host| format!("{}:{}", host, u.port_or_known_default().unwrap_or(80)))
            }),
            _ => None,
        })
        .collect();

    if hosts.is_empty() {
        return;
    }

    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            for host in hosts {
                match tokio::net::lookup_host(&host).await {
                    Ok(_) => debug!("dns prefetch ok for {host}"),
                    Err(e) => warn!("dns prefetch failed for {host}: {e}"),
                }
            }
        });
    }
}
