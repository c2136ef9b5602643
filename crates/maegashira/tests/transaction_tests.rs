use maegashira::models::transaction::{CancellationReason, Transaction};

fn transaction() -> Transaction {
    Transaction::new(
        "127.0.0.1".to_string(),
        "GET".to_string(),
        "http://localhost/api".to_string(),
        Some("curl/8".to_string()),
        42,
    )
}

#[test]
fn finalize_stamps_terminal_fields() {
    let mut txn = transaction();
    txn.finalize(200, "OK", 1024);

    assert_eq!(txn.status, Some(200));
    assert_eq!(txn.status_text.as_deref(), Some("OK"));
    assert_eq!(txn.response_bytes, Some(1024));
    assert!(txn.end.is_some());
    assert!(txn.duration.unwrap() >= 0);
    assert!(txn.total_overhead.unwrap() >= 0);
}

#[test]
fn overhead_is_duration_minus_target_time_clamped_to_zero() {
    let mut txn = transaction();
    txn.target_request_started("forward");
    // Simulate a target call that reportedly took longer than the whole
    // request (clock skew); overhead must clamp to zero, not go negative.
    txn.target_request_finished();
    txn.target_request_duration = Some(10_000);
    txn.finalize(200, "OK", 0);

    assert_eq!(txn.total_overhead, Some(0));
    assert!(txn.overhead_pct.unwrap() >= 0.0);
}

#[test]
fn phase_markers_fill_start_end_and_duration() {
    let mut txn = transaction();
    txn.resolving_started();
    txn.resolving_finished();
    txn.preprocessing_started();
    txn.preprocessing_finished();

    assert!(txn.resolving_start.is_some());
    assert!(txn.resolving_end.is_some());
    assert!(txn.resolving_duration.unwrap() >= 0);
    assert!(txn.preprocessing_duration.unwrap() >= 0);
    assert!(txn.postprocessing_start.is_none());
}

#[test]
fn cancellation_reasons_serialize_to_their_wire_names() {
    assert_eq!(CancellationReason::FetchFailed.as_str(), "fetch_failed");
    assert_eq!(CancellationReason::Timeout.as_str(), "timeout");
    assert_eq!(CancellationReason::RouteMatch.as_str(), "route_match");
    assert_eq!(
        CancellationReason::middleware("geo").as_str(),
        "middleware_cancelled:geo"
    );
}

#[test]
fn cancel_marks_the_record() {
    let mut txn = transaction();
    txn.cancel(CancellationReason::Timeout);
    assert!(txn.cancelled);
    assert_eq!(txn.cancellation_reason.as_deref(), Some("timeout"));
}

#[test]
fn skipped_phases_stay_absent_in_the_serialized_record() {
    let mut txn = transaction();
    txn.resolving_started();
    txn.resolving_finished();
    txn.finalize(404, "Not Found", 14);

    let value = serde_json::to_value(&txn).expect("serializable");
    let record = value.as_object().expect("object");

    assert!(record.contains_key("resolving_start"));
    assert!(!record.contains_key("preprocessing_start"));
    assert!(!record.contains_key("target_request_start"));
    assert_eq!(record["cache"], "no-cache");
    assert_eq!(record["cancelled"], false);

    // ISO-8601 UTC timestamps on the wire.
    let start = record["start"].as_str().expect("start is a string");
    assert!(start.contains('T'));
}

#[test]
fn identifiers_are_unique_per_transaction() {
    assert_ne!(transaction().id, transaction().id);
}
