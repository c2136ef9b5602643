//! Primary controller: boots the cluster and owns its lifecycle.
//!
//! Boot order: authoritative store (with the initial table, when given),
//! transaction sink, discovery loop, management listener, then the public
//! listener whose app factory runs once per worker. Shutdown stops the
//! management listener first, drains workers within the grace period and
//! flushes the sink last.

use crate::config::settings::Settings;
use crate::middleware::pipeline::MiddlewareRegistry;
use crate::models::route::RoutingTable;
use crate::routes::{api, docs, health, metrics};
use crate::services::dispatcher::Dispatcher;
use crate::services::handler::{self, WorkerContext};
use crate::services::routing_table::{RoutingTableStore, WorkerTable};
use crate::services::sink::TransactionSink;
use crate::services::discovery;
use crate::{PRODUCT, VERSION};
use actix_web::{web, App, HttpServer};
use log::{error, info, warn};
use std::io;
use std::sync::Arc;
use tokio::signal;

/// Maximum request body buffered for pre-processing.
const PAYLOAD_LIMIT: usize = 16 * 1024 * 1024;

/// Runs the proxy until a shutdown signal or a fatal listener error.
///
/// `initial_table` is validated through the store before anything binds;
/// an invalid inline table is a startup failure. `registry` carries the
/// embedding application's middlewares and is frozen from here on.
pub async fn run(
    settings: Settings,
    initial_table: Option<RoutingTable>,
    registry: MiddlewareRegistry,
) -> io::Result<()> {
    info!("starting {PRODUCT} v{VERSION}");

    let store = Arc::new(RoutingTableStore::new());
    if let Some(table) = initial_table {
        store
            .set(table)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    }

    let dispatcher = Dispatcher::new(settings.timeout_ms)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    let registry = Arc::new(registry);
    let debug_headers = settings.debug_headers();

    let sink = TransactionSink::spawn(settings.clustering.then(|| settings.redis.clone()));
    let sink_handle = sink.handle();
    let metrics_collector =
        metrics::MetricsCollector::with_transaction_queue(sink.queue_depth_gauge());

    let discovery_task = discovery::spawn(settings.discovery.clone(), Arc::clone(&store));

    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let workers = match settings.workers {
        0 => available,
        n => n.min(available),
    };
    let grace_secs = (settings.grace_period_ms + 999) / 1000;

    // Public listener: the factory runs once per worker, so each worker
    // gets its own routing-table copy attached to the store.
    let public_store = Arc::clone(&store);
    let public_registry = Arc::clone(&registry);
    let public_metrics = metrics_collector.clone();
    let public = HttpServer::new(move || {
        let table = WorkerTable::attach(Arc::clone(&public_store));
        App::new()
            .app_data(web::PayloadConfig::new(PAYLOAD_LIMIT))
            .app_data(web::Data::new(WorkerContext {
                table,
                registry: Arc::clone(&public_registry),
                dispatcher: dispatcher.clone(),
                sink: sink_handle.clone(),
                metrics: public_metrics.clone(),
                debug_headers,
            }))
            .default_service(web::to(handler::handle))
    })
    .workers(workers)
    .shutdown_timeout(grace_secs)
    .bind((settings.hostname.as_str(), settings.port))?
    .run();
    info!(
        "public listener on {}:{} with {workers} worker(s)",
        settings.hostname, settings.port
    );

    // Management listener on its own port; one worker is plenty for the
    // side-channel.
    let api_server = if settings.api.enabled {
        if settings.api.key.is_empty() {
            warn!("management api enabled without an api key; protected endpoints will reject every request");
        }
        let state = api::ApiState {
            store: Arc::clone(&store),
            key: settings.api.key.clone(),
        };
        let api_metrics = metrics_collector.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .app_data(web::Data::new(api_metrics.clone()))
                .configure(health::configure_health)
                .configure(metrics::configure_metrics)
                .configure(api::configure_api)
                .configure(docs::configure_docs)
        })
        .workers(1)
        .bind((settings.api.hostname.as_str(), settings.api.port))?
        .run();
        info!(
            "management api on {}:{}",
            settings.api.hostname, settings.api.port
        );
        Some(server)
    } else {
        None
    };

    let public_handle = public.handle();
    let api_handle = api_server.as_ref().map(|server| server.handle());
    let api_future = async {
        match api_server {
            Some(server) => server.await,
            None => std::future::pending::<io::Result<()>>().await,
        }
    };

    tokio::pin!(public);
    tokio::pin!(api_future);

    let mut exit: io::Result<()> = Ok(());
    let signalled = tokio::select! {
        result = &mut public => {
            match &result {
                Ok(_) => info!("public listener stopped"),
                Err(e) => error!("public listener failed: {e}"),
            }
            exit = result;
            false
        }
        result = &mut api_future => {
            match &result {
                Ok(_) => info!("management listener stopped"),
                Err(e) => error!("management listener failed: {e}"),
            }
            exit = result;
            false
        }
        _ = signal::ctrl_c() => true
    };

    if signalled {
        info!("shutdown signal received, draining");
        if let Some(handle) = &api_handle {
            handle.stop(true).await;
        }
        public_handle.stop(true).await;
        exit = (&mut public).await;
    }

    if let Some(task) = discovery_task {
        task.abort();
    }
    sink.shutdown().await;
    info!("{PRODUCT} stopped");
    exit
}
