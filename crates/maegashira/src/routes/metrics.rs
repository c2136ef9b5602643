//! Prometheus-compatible metrics endpoint.
//!
//! A single shared collector is updated by every worker and rendered in
//! exposition text format by the management listener, which is what
//! aggregates the cluster view in the single-process topology.

use actix_web::{web, HttpResponse, Responder};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Thread-safe request counters shared by every worker.
///
/// Counters use relaxed atomics; the per-status map takes a short write
/// lock off the hot path's critical sections.
#[derive(Clone)]
pub struct MetricsCollector {
    requests_total: Arc<AtomicU64>,
    duration_sum_ms: Arc<AtomicU64>,
    in_flight: Arc<AtomicU64>,
    peak_in_flight: Arc<AtomicU64>,
    responses_by_code: Arc<RwLock<BTreeMap<u16, u64>>>,
    transaction_queue_depth: Arc<AtomicU64>,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            duration_sum_ms: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            peak_in_flight: Arc::new(AtomicU64::new(0)),
            responses_by_code: Arc::new(RwLock::new(BTreeMap::new())),
            transaction_queue_depth: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }
}

impl MetricsCollector {
    /// Builds a collector whose queue-depth gauge is shared with the
    /// transaction sink, so `/metrics` reports the undelivered backlog.
    pub fn with_transaction_queue(gauge: Arc<AtomicU64>) -> Self {
        Self {
            transaction_queue_depth: gauge,
            ..Self::default()
        }
    }

    /// Marks a request in flight, tracking the concurrency peak.
    pub fn request_started(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        let mut peak = self.peak_in_flight.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_in_flight.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
    }

    /// Records a finished request with its response code and duration.
    pub fn request_finished(&self, status: u16, duration_ms: i64) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.duration_sum_ms
            .fetch_add(duration_ms.max(0) as u64, Ordering::Relaxed);
        if let Ok(mut codes) = self.responses_by_code.write() {
            *codes.entry(status).or_insert(0) += 1;
        }
    }

    /// Renders the Prometheus exposition text.
    pub fn render(&self) -> String {
        let requests_total = self.requests_total.load(Ordering::Relaxed);
        let duration_sum = self.duration_sum_ms.load(Ordering::Relaxed);
        let in_flight = self.in_flight.load(Ordering::Relaxed);
        let peak = self.peak_in_flight.load(Ordering::Relaxed);
        let queue_depth = self.transaction_queue_depth.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed().as_secs();

        let mut out = String::new();
        out.push_str("# HELP responses_codes Responses by HTTP status code\n");
        out.push_str("# TYPE responses_codes counter\n");
        if let Ok(codes) = self.responses_by_code.read() {
            for (code, count) in codes.iter() {
                out.push_str(&format!("responses_codes{{code=\"{code}\"}} {count}\n"));
            }
        }

        out.push_str(&format!(
            "\n# HELP maegashira_requests_total Total requests handled\n\
             # TYPE maegashira_requests_total counter\n\
             maegashira_requests_total {requests_total}\n\
             \n# HELP maegashira_request_duration_ms_sum Summed request durations in milliseconds\n\
             # TYPE maegashira_request_duration_ms_sum counter\n\
             maegashira_request_duration_ms_sum {duration_sum}\n\
             \n# HELP maegashira_in_flight_requests Requests currently in flight\n\
             # TYPE maegashira_in_flight_requests gauge\n\
             maegashira_in_flight_requests {in_flight}\n\
             \n# HELP maegashira_peak_in_flight_requests Peak concurrent requests observed\n\
             # TYPE maegashira_peak_in_flight_requests gauge\n\
             maegashira_peak_in_flight_requests {peak}\n\
             \n# HELP maegashira_transaction_queue_depth Transaction records queued for the sink\n\
             # TYPE maegashira_transaction_queue_depth gauge\n\
             maegashira_transaction_queue_depth {queue_depth}\n\
             \n# HELP maegashira_uptime_seconds Process uptime in seconds\n\
             # TYPE maegashira_uptime_seconds counter\n\
             maegashira_uptime_seconds {uptime}\n"
        ));
        out
    }
}

/// `GET /metrics` renders the exposition text for scrapers.
pub async fn metrics_endpoint(metrics: web::Data<MetricsCollector>) -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(metrics.render())
}

pub fn configure_metrics(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_endpoint));
}
