//! Per-request telemetry record.
//!
//! A `Transaction` is created when a request enters the worker, stamped as
//! the request moves through the state machine, finalized when the response
//! is produced, and delivered exactly once to the post-transaction sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Why a request was cancelled before producing an upstream response.
#[derive(Debug, Clone, PartialEq)]
pub enum CancellationReason {
    /// The upstream call failed to complete.
    FetchFailed,
    /// The per-route deadline expired.
    Timeout,
    /// No routing-table entry matched the request.
    RouteMatch,
    /// A pre-processing middleware cancelled the request; carries either
    /// the handler-supplied reason or `middleware_cancelled:<key>`.
    Middleware(String),
}

impl CancellationReason {
    pub fn as_str(&self) -> &str {
        match self {
            CancellationReason::FetchFailed => "fetch_failed",
            CancellationReason::Timeout => "timeout",
            CancellationReason::RouteMatch => "route_match",
            CancellationReason::Middleware(reason) => reason,
        }
    }

    /// Default reason for a middleware cancellation that supplied none.
    pub fn middleware(key: &str) -> Self {
        CancellationReason::Middleware(format!("middleware_cancelled:{key}"))
    }
}

/// Flat per-request record; optional fields stay absent when the phase did
/// not execute. Timestamps are ISO-8601 UTC, durations are milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    // Identity
    pub id: Uuid,
    pub start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,

    // Request
    pub client_ip: String,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub request_bytes: u64,

    // Resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolving_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolving_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolving_duration: Option<i64>,

    // Middleware phases
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessing_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessing_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessing_duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postprocessing_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postprocessing_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postprocessing_duration: Option<i64>,

    // Target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_request_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_request_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_request_duration: Option<i64>,

    // Cancellation
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,

    // Cache
    pub cache: String,

    // Response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_bytes: Option<u64>,

    // Overhead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_overhead: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overhead_pct: Option<f64>,
}

impl Transaction {
    /// Opens a new transaction at request entry.
    pub fn new(
        client_ip: String,
        method: String,
        url: String,
        user_agent: Option<String>,
        request_bytes: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            start: Utc::now(),
            end: None,
            duration: None,
            client_ip,
            method,
            url,
            user_agent,
            request_bytes,
            resolving_start: None,
            resolving_end: None,
            resolving_duration: None,
            preprocessing_start: None,
            preprocessing_end: None,
            preprocessing_duration: None,
            postprocessing_start: None,
            postprocessing_end: None,
            postprocessing_duration: None,
            target_type: None,
            target_request_start: None,
            target_request_end: None,
            target_request_duration: None,
            cancelled: false,
            cancellation_reason: None,
            cache: "no-cache".to_string(),
            status: None,
            status_text: None,
            response_bytes: None,
            total_overhead: None,
            overhead_pct: None,
        }
    }

    pub fn resolving_started(&mut self) {
        self.resolving_start = Some(Utc::now());
    }

    pub fn resolving_finished(&mut self) {
        let end = Utc::now();
        self.resolving_duration = Some(phase_duration(self.resolving_start, end));
        self.resolving_end = Some(end);
    }

    pub fn preprocessing_started(&mut self) {
        self.preprocessing_start = Some(Utc::now());
    }

    pub fn preprocessing_finished(&mut self) {
        let end = Utc::now();
        self.preprocessing_duration = Some(phase_duration(self.preprocessing_start, end));
        self.preprocessing_end = Some(end);
    }

    pub fn postprocessing_started(&mut self) {
        self.postprocessing_start = Some(Utc::now());
    }

    pub fn postprocessing_finished(&mut self) {
        let end = Utc::now();
        self.postprocessing_duration = Some(phase_duration(self.postprocessing_start, end));
        self.postprocessing_end = Some(end);
    }

    pub fn target_request_started(&mut self, target_type: &str) {
        self.target_type = Some(target_type.to_string());
        self.target_request_start = Some(Utc::now());
    }

    pub fn target_request_finished(&mut self) {
        let end = Utc::now();
        self.target_request_duration = Some(phase_duration(self.target_request_start, end));
        self.target_request_end = Some(end);
    }

    /// Marks the transaction cancelled with the given reason.
    pub fn cancel(&mut self, reason: CancellationReason) {
        self.cancelled = true;
        self.cancellation_reason = Some(reason.as_str().to_string());
    }

    /// Stamps the terminal fields and computes durations and overhead.
    ///
    /// Negative values produced by clock skew are clamped to zero.
    pub fn finalize(&mut self, status: u16, status_text: &str, response_bytes: u64) {
        let end = Utc::now();
        let duration = (end - self.start).num_milliseconds().max(0);
        self.end = Some(end);
        self.duration = Some(duration);
        self.status = Some(status);
        self.status_text = Some(status_text.to_string());
        self.response_bytes = Some(response_bytes);

        let overhead = (duration - self.target_request_duration.unwrap_or(0)).max(0);
        self.total_overhead = Some(overhead);
        self.overhead_pct = Some(if duration > 0 {
            overhead as f64 / duration as f64 * 100.0
        } else {
            0.0
        });
    }
}

fn phase_duration(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> i64 {
    start
        .map(|s| (end - s).num_milliseconds().max(0))
        .unwrap_or(0)
}
