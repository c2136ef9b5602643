//! The per-request state machine.
//!
//! Every public-listener request runs RESOLVING → PRE_PROCESSING →
//! AUTHENTICATING → DISPATCHING → POST_PROCESSING → FINALIZE. Each terminal
//! state funnels through [`finalize`], which stamps the transaction,
//! records metrics and enqueues exactly one record to the sink.

use crate::middleware::auth::authenticate;
use crate::middleware::pipeline::{
    run_pipeline, MiddlewareRegistry, MiddlewareState, PipelineOutcome,
};
use crate::models::error::ProxyError;
use crate::models::route::{Authentication, Route, Target};
use crate::models::transaction::{CancellationReason, Transaction};
use crate::routes::metrics::MetricsCollector;
use crate::services::dispatcher::{Dispatcher, InboundRequest};
use crate::services::routing_table::WorkerTable;
use crate::services::sink::SinkHandle;
use crate::utils::route_matcher::{match_route, normalize_host};
use actix_web::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::web::{Bytes, Data};
use actix_web::{HttpRequest, HttpResponse};
use log::{debug, error, info, warn};
use rand::Rng;
use std::sync::Arc;

/// Everything one worker needs to serve requests.
///
/// Built once per worker by the server bootstrap; the routing-table copy is
/// private to the worker, the rest is shared process state.
pub struct WorkerContext {
    pub table: Arc<WorkerTable>,
    pub registry: Arc<MiddlewareRegistry>,
    pub dispatcher: Dispatcher,
    pub sink: SinkHandle,
    pub metrics: MetricsCollector,
    pub debug_headers: bool,
}

/// Entry point attached as the public listener's default service.
pub async fn handle(req: HttpRequest, body: Bytes, ctx: Data<WorkerContext>) -> HttpResponse {
    ctx.metrics.request_started();

    let (scheme, host_raw, client_ip) = {
        let info = req.connection_info();
        (
            info.scheme().to_string(),
            info.host().to_string(),
            info.realip_remote_addr().unwrap_or("unknown").to_string(),
        )
    };

    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut txn = Transaction::new(
        client_ip,
        req.method().to_string(),
        format!("{scheme}://{host_raw}{}", req.uri()),
        user_agent,
        body.len() as u64,
    );

    // RESOLVING: capture the snapshot once; the request completes against
    // it even if the table is replaced mid-flight.
    txn.resolving_started();
    let snapshot = ctx.table.load();
    let host = normalize_host(&host_raw);
    let route = match_route(&host, req.path(), &snapshot).cloned();
    txn.resolving_finished();

    let route = match route {
        Some(route) => route,
        None => {
            debug!("no route matches {host}{}", req.path());
            txn.cancel(CancellationReason::RouteMatch);
            let (status, headers, body) = ProxyError::RouteMatchMiss.response_parts();
            return finalize(&ctx, txn, status, headers, body);
        }
    };

    // PRE_PROCESSING
    let mut request_headers = req.headers().clone();
    let mut request_body = body;
    let pre = route.pre_middlewares();
    if !pre.is_empty() {
        txn.preprocessing_started();
        let state = MiddlewareState::new(txn.clone(), request_headers, request_body);
        match run_pipeline(&ctx.registry, pre, state).await {
            PipelineOutcome::Completed(state) => {
                txn.preprocessing_finished();
                request_headers = state.headers;
                request_body = state.body;
            }
            PipelineOutcome::Cancelled { key, reason, .. } => {
                txn.preprocessing_finished();
                info!("request cancelled by middleware '{key}'");
                txn.cancel(CancellationReason::Middleware(reason.clone()));
                let (status, headers, body) =
                    ProxyError::MiddlewareCancelled { reason }.response_parts();
                return finalize(&ctx, txn, status, headers, body);
            }
        }
    }

    // AUTHENTICATING: runs over the effective headers, so pre-processing
    // may have injected credentials.
    let auth = route
        .authentication
        .clone()
        .unwrap_or(Authentication::Anonymous);
    if let Err(err) = authenticate(&auth, &request_headers, &host) {
        debug!("authentication failed for {host}{}", req.path());
        let (status, headers, body) = err.response_parts();
        return finalize(&ctx, txn, status, headers, body);
    }

    // DISPATCHING
    let target = select_target(&route).clone();
    let inbound = InboundRequest {
        method: req.method().clone(),
        headers: request_headers,
        body: request_body,
        path: req.path().to_string(),
        query: req.query_string().to_string(),
    };

    txn.target_request_started(target.kind());
    let dispatched = ctx.dispatcher.dispatch(&route, &target, &inbound).await;
    txn.target_request_finished();

    let outcome = match dispatched {
        Ok(outcome) => outcome,
        Err(err) => {
            match &err {
                ProxyError::UpstreamTimeout => txn.cancel(CancellationReason::Timeout),
                ProxyError::UpstreamFetchFailed { source } => {
                    error!("upstream fetch failed: {source}");
                    txn.cancel(CancellationReason::FetchFailed);
                }
                _ => {}
            }
            let (status, headers, body) = err.response_parts();
            return finalize(&ctx, txn, status, headers, body);
        }
    };

    // POST_PROCESSING: mutates the outgoing response; it cannot unblock or
    // retract the dispatch, so a cancel verdict here only stops the
    // remaining handlers.
    let mut response_headers = outcome.headers;
    let mut response_body = outcome.body;
    let post = route.post_middlewares();
    if !post.is_empty() {
        txn.postprocessing_started();
        let state = MiddlewareState::new(txn.clone(), response_headers, response_body);
        match run_pipeline(&ctx.registry, post, state).await {
            PipelineOutcome::Completed(state) => {
                response_headers = state.headers;
                response_body = state.body;
            }
            PipelineOutcome::Cancelled { key, state, .. } => {
                warn!("post-processing middleware '{key}' signalled cancel; response already dispatched");
                response_headers = state.headers;
                response_body = state.body;
            }
        }
        txn.postprocessing_finished();
    }

    finalize(&ctx, txn, outcome.status, response_headers, response_body)
}

/// Picks the target for this dispatch. A single target is returned as-is;
/// multiple targets are selected uniformly at random.
fn select_target(route: &Route) -> &Target {
    match route.targets.len() {
        1 => &route.targets[0],
        len => {
            let index = rand::thread_rng().gen_range(0..len);
            &route.targets[index]
        }
    }
}

/// FINALIZE: stamps the terminal transaction fields, records metrics,
/// enqueues the record and materializes the response.
fn finalize(
    ctx: &WorkerContext,
    mut txn: Transaction,
    status: StatusCode,
    mut headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    txn.finalize(
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.len() as u64,
    );

    if ctx.debug_headers {
        insert_transaction_headers(&mut headers, &txn);
    }

    ctx.metrics
        .request_finished(status.as_u16(), txn.duration.unwrap_or(0));
    ctx.sink.enqueue(&txn);

    let mut builder = HttpResponse::build(status);
    for (name, value) in headers.iter() {
        builder.append_header((name.clone(), value.clone()));
    }
    builder.body(body)
}

fn insert_transaction_headers(headers: &mut HeaderMap, txn: &Transaction) {
    let overhead_pct = txn.overhead_pct.unwrap_or(0.0);
    let pairs = [
        ("x-maegashira-transaction-id", txn.id.to_string()),
        ("x-maegashira-transaction-cache", txn.cache.clone()),
        (
            "x-maegashira-transaction-duration",
            txn.duration.unwrap_or(0).to_string(),
        ),
        (
            "x-maegashira-transaction-overhead",
            txn.total_overhead.unwrap_or(0).to_string(),
        ),
        (
            "x-maegashira-transaction-overhead-percentage",
            format!("{overhead_pct:.2}"),
        ),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}
