// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flush scheduler integration tests
//!
//! Drives the periodic timer on a paused tokio clock, so every interval
//! elapses deterministically.

use async_trait::async_trait;
use batching_influx::{
    BatchConfig, BatchingInflux, BoxError, Point, PointWriter, SchedulerState,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;

const WRITE_INTERVAL: Duration = Duration::from_millis(100);

/// In-memory stand-in for an InfluxDB client.
#[derive(Default)]
struct MockInflux {
    written: Mutex<Vec<Point>>,
    batches: Mutex<Vec<usize>>,
    calls: AtomicUsize,
    fail: AtomicBool,
    /// When set, writes wait for a notification before completing.
    gate: Option<Arc<Notify>>,
}

impl MockInflux {
    fn failing() -> Self {
        let mock = Self::default();
        mock.fail.store(true, Ordering::SeqCst);
        mock
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn written_len(&self) -> usize {
        self.written.lock().len()
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PointWriter for MockInflux {
    async fn write_points(&self, points: Vec<Point>) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err("A mock failure".into());
        }
        self.batches.lock().push(points.len());
        self.written.lock().extend(points);
        Ok(())
    }
}

fn fake_point() -> Point {
    Point::new("foo").field("aField", "aField")
}

fn start(mock: &Arc<MockInflux>, config: BatchConfig) -> BatchingInflux<Arc<MockInflux>> {
    let influx = BatchingInflux::new(Arc::clone(mock), config).expect("valid config");
    influx.start_periodic_flush();
    influx
}

fn test_config() -> BatchConfig {
    BatchConfig::default()
        .with_flush_interval(WRITE_INTERVAL)
        .with_max_failed_attempts(2)
}

#[tokio::test(start_paused = true)]
async fn test_writes_points_on_interval() {
    let mock = Arc::new(MockInflux::default());
    let influx = start(&mock, test_config());

    influx.add_point(fake_point());
    assert_eq!(mock.written_len(), 0, "points should not have been written yet");

    sleep(WRITE_INTERVAL + Duration::from_millis(1)).await;

    assert_eq!(mock.written_len(), 1, "should have been written after one interval");
    assert_eq!(influx.pending_len(), 0, "should empty cached points after write");
    assert_eq!(influx.state(), SchedulerState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_aborts_after_max_failed_attempts() {
    let mock = Arc::new(MockInflux::failing());
    let influx = start(&mock, test_config());

    influx.add_point(fake_point());
    sleep(WRITE_INTERVAL + Duration::from_millis(1)).await;

    assert_eq!(influx.failed_attempts(), 1);
    assert_eq!(influx.state(), SchedulerState::Running);

    influx.add_point(fake_point());
    sleep(WRITE_INTERVAL).await;

    assert_eq!(influx.failed_attempts(), 2);
    assert_eq!(influx.state(), SchedulerState::Aborted);
    assert_eq!(influx.stats().aborts, 1);

    // Timer is gone: queued points are no longer flushed
    influx.add_point(fake_point());
    sleep(WRITE_INTERVAL * 5).await;
    assert_eq!(mock.calls(), 2);
    assert_eq!(influx.pending_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_writes_when_max_batch_size_reached() {
    let mock = Arc::new(MockInflux::default());
    let influx = start(&mock, test_config());
    influx.set_max_batch_size(2);

    influx.add_point(fake_point());
    influx.add_point(fake_point());

    // The batch is swapped out before add_point returns
    assert_eq!(influx.pending_len(), 0);

    sleep(Duration::from_millis(10)).await;

    assert_eq!(mock.written_len(), 2, "should have written cached points");
    assert_eq!(*mock.batches.lock(), vec![2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_threshold_reached_from_producer_thread() {
    let mock = Arc::new(MockInflux::default());
    let influx = Arc::new(start(&mock, test_config().with_max_batch_size(2)));

    let producer = {
        let influx = Arc::clone(&influx);
        std::thread::spawn(move || {
            for _ in 0..10 {
                influx.add_point(fake_point());
                assert!(influx.pending_len() < 2);
            }
        })
    };
    producer.join().expect("producer thread");

    sleep(Duration::from_millis(50)).await;

    assert_eq!(influx.pending_len(), 0);
    assert_eq!(mock.written_len(), 10);
    assert_eq!(*mock.batches.lock(), vec![2; 5]);
}

#[tokio::test(start_paused = true)]
async fn test_size_threshold_flushes_while_stopped() {
    let mock = Arc::new(MockInflux::default());
    let influx = BatchingInflux::new(
        Arc::clone(&mock),
        test_config().with_max_batch_size(3),
    )
    .expect("valid config");

    influx.add_points(vec![fake_point(), fake_point()]);
    sleep(WRITE_INTERVAL * 3).await;
    assert_eq!(mock.calls(), 0, "no timer while stopped");

    influx.add_point(fake_point());
    sleep(Duration::from_millis(1)).await;
    assert_eq!(mock.written_len(), 3);
    assert_eq!(influx.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_pending_never_exceeds_threshold_by_more_than_one_call() {
    let mock = Arc::new(MockInflux::default());
    let influx = start(&mock, test_config().with_max_batch_size(3));

    for _ in 0..10 {
        influx.add_point(fake_point());
        assert!(influx.pending_len() < 3);
    }

    influx.add_points((0..5).map(|_| fake_point()));
    assert_eq!(influx.pending_len(), 0);

    sleep(Duration::from_millis(1)).await;
    assert_eq!(*mock.batches.lock(), vec![3, 3, 3, 6]);
}

#[tokio::test(start_paused = true)]
async fn test_points_added_during_write_go_to_next_batch() {
    let gate = Arc::new(Notify::new());
    let mock = Arc::new(MockInflux::gated(Arc::clone(&gate)));
    let influx = start(&mock, test_config().with_max_batch_size(2));

    influx.add_points(vec![fake_point(), fake_point()]);
    // Let the write start and block on the gate
    sleep(Duration::from_millis(1)).await;
    assert_eq!(mock.calls(), 1);

    influx.add_point(fake_point());
    assert_eq!(influx.pending_len(), 1);

    gate.notify_one();
    sleep(Duration::from_millis(1)).await;

    assert_eq!(*mock.batches.lock(), vec![2]);
    assert_eq!(influx.pending_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_abort_keeps_failure_count() {
    let mock = Arc::new(MockInflux::failing());
    let influx = start(&mock, test_config());

    for _ in 0..2 {
        influx.add_point(fake_point());
        sleep(WRITE_INTERVAL + Duration::from_millis(1)).await;
    }
    assert_eq!(influx.state(), SchedulerState::Aborted);

    influx.add_point(fake_point());
    influx.start_periodic_flush();
    assert_eq!(influx.state(), SchedulerState::Running);

    sleep(WRITE_INTERVAL + Duration::from_millis(1)).await;

    // A single failure after restart aborts again
    assert_eq!(influx.failed_attempts(), 3);
    assert_eq!(influx.state(), SchedulerState::Aborted);
    assert_eq!(influx.stats().aborts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_points_queued_while_aborted_are_written_after_restart() {
    let mock = Arc::new(MockInflux::failing());
    let influx = start(&mock, test_config());

    for _ in 0..2 {
        influx.add_point(fake_point());
        sleep(WRITE_INTERVAL + Duration::from_millis(1)).await;
    }
    assert_eq!(influx.state(), SchedulerState::Aborted);

    influx.add_point(Point::new("late").field("v", 1i64));
    sleep(WRITE_INTERVAL * 3).await;
    assert_eq!(influx.pending_len(), 1);

    mock.fail.store(false, Ordering::SeqCst);
    influx.start_periodic_flush();
    sleep(WRITE_INTERVAL + Duration::from_millis(1)).await;

    let written = mock.written.lock().clone();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].measurement, "late");
    assert_eq!(influx.failed_attempts(), 0);
    assert_eq!(influx.state(), SchedulerState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_empty_ticks_do_not_write_or_notify() {
    let observed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&observed);

    let mock = Arc::new(MockInflux::default());
    let influx = start(&mock, test_config()).with_on_flush(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    sleep(WRITE_INTERVAL * 5 + Duration::from_millis(1)).await;
    assert_eq!(mock.calls(), 0);
    assert_eq!(observed.load(Ordering::SeqCst), 0);

    influx.add_point(fake_point());
    sleep(WRITE_INTERVAL).await;
    assert_eq!(mock.calls(), 1);
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_observer_sees_batch_before_write() {
    let mock = Arc::new(MockInflux::default());
    let seen_by_observer = Arc::new(Mutex::new(Vec::new()));

    let observer_mock = Arc::clone(&mock);
    let seen = Arc::clone(&seen_by_observer);
    let influx = start(&mock, test_config()).with_on_flush(move |batch| {
        // Nothing from this batch has reached the database yet
        seen.lock().push((batch.len(), observer_mock.written_len()));
    });

    influx.add_points(vec![fake_point(), fake_point()]);
    sleep(WRITE_INTERVAL + Duration::from_millis(1)).await;

    assert_eq!(*seen_by_observer.lock(), vec![(2, 0)]);
    assert_eq!(mock.written_len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_suppresses_timer() {
    let mock = Arc::new(MockInflux::default());
    let influx = start(&mock, test_config());

    influx.add_point(fake_point());
    influx.stop_periodic_flush();
    sleep(WRITE_INTERVAL * 3).await;

    assert_eq!(mock.calls(), 0);
    assert_eq!(influx.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_keeps_single_timer() {
    let mock = Arc::new(MockInflux::default());
    let influx = start(&mock, test_config());

    // A second timer started here would tick at 150ms
    sleep(Duration::from_millis(50)).await;
    influx.start_periodic_flush();

    sleep(Duration::from_millis(51)).await;
    influx.add_point(fake_point());

    sleep(Duration::from_millis(60)).await;
    assert_eq!(mock.calls(), 0, "next tick of the original timer is at 200ms");

    sleep(Duration::from_millis(40)).await;
    assert_eq!(mock.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_releases_writer() {
    let mock = Arc::new(MockInflux::default());
    let influx = start(&mock, test_config());
    assert_eq!(Arc::strong_count(&mock), 2);

    drop(influx);
    sleep(WRITE_INTERVAL * 2).await;

    assert_eq!(Arc::strong_count(&mock), 1);
    assert_eq!(mock.calls(), 0);
}
