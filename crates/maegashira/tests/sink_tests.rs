use maegashira::models::transaction::Transaction;
use maegashira::services::sink::{reconnect_backoff, TransactionSink};
use std::time::Duration;

#[test]
fn backoff_is_clamped_between_one_and_twenty_seconds() {
    assert_eq!(reconnect_backoff(0), Duration::from_millis(1000));
    assert_eq!(reconnect_backoff(1), Duration::from_millis(1000));
    assert_eq!(reconnect_backoff(10), Duration::from_millis(20_000));
    assert_eq!(reconnect_backoff(100), Duration::from_millis(20_000));
}

#[test]
fn backoff_is_monotone_non_decreasing() {
    let mut previous = Duration::ZERO;
    for attempt in 0..=20 {
        let backoff = reconnect_backoff(attempt);
        assert!(backoff >= previous, "attempt {attempt} regressed");
        previous = backoff;
    }
}

#[test]
fn backoff_leaves_the_floor_once_exp_crosses_it() {
    // exp(7) ~ 1096ms is the first value above the floor.
    assert_eq!(reconnect_backoff(6), Duration::from_millis(1000));
    assert!(reconnect_backoff(7) > Duration::from_millis(1000));
    assert!(reconnect_backoff(7) < Duration::from_millis(1200));
}

#[test]
fn log_only_sink_accepts_records_and_flushes_on_shutdown() {
    tokio_test::block_on(async {
        let sink = TransactionSink::spawn(None);
        let handle = sink.handle();

        for _ in 0..10 {
            let transaction = Transaction::new(
                "127.0.0.1".to_string(),
                "GET".to_string(),
                "http://localhost/".to_string(),
                None,
                0,
            );
            handle.enqueue(&transaction);
        }

        // The queue is unbounded; every record is accepted and the depth
        // gauge returns to zero once the drain task catches up.
        for _ in 0..100 {
            if handle.depth() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.depth(), 0);

        drop(handle);
        sink.shutdown().await;
    });
}

#[test]
fn enqueue_tracks_queue_depth() {
    tokio_test::block_on(async {
        let sink = TransactionSink::spawn(None);
        let handle = sink.handle();
        let gauge = sink.queue_depth_gauge();

        let transaction = Transaction::new(
            "127.0.0.1".to_string(),
            "GET".to_string(),
            "http://localhost/".to_string(),
            None,
            0,
        );
        handle.enqueue(&transaction);
        // The gauge never reads higher than what was enqueued and drains
        // back to zero.
        assert!(gauge.load(std::sync::atomic::Ordering::Relaxed) <= 1);

        drop(handle);
        sink.shutdown().await;
        assert_eq!(gauge.load(std::sync::atomic::Ordering::Relaxed), 0);
    });
}
