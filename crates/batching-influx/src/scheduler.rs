// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batching flush scheduler.
//!
//! Connects the point cache, the periodic timer and the database client
//! into a single entry point.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --start_periodic_flush()--> Running
//! Running --max_failed_attempts consecutive failures--> Aborted
//! Aborted --start_periodic_flush()--> Running
//! ```
//!
//! Points can be added in every state. Outside `Running` they are only
//! flushed when the batch size threshold is reached or on an explicit
//! [`BatchingInflux::flush`].

use crate::cache::PointCache;
use crate::client::{FromConnectionParams, PointWriter};
use crate::config::{BatchConfig, InfluxConfig};
use crate::error::{Error, Result};
use crate::point::Point;
use crate::url::ConnectionTarget;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Callback invoked with each outgoing batch just before it is written.
pub type FlushObserver = Arc<dyn Fn(&[Point]) + Send + Sync>;

/// Periodic flush lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer. Initial state, or after `stop_periodic_flush`.
    Stopped,
    /// Timer active.
    Running,
    /// Timer cleared after too many consecutive failed writes.
    Aborted,
}

/// Result of a single flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending; no write was made.
    Empty,
    /// The batch was written.
    Written { points: usize },
    /// The write failed; `consecutive` failures so far.
    Failed { consecutive: u32 },
    /// The write failed and the failure threshold has been reached.
    Aborted { consecutive: u32 },
}

/// Scheduler statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Batches written successfully
    pub batches_written: u64,
    /// Points written successfully
    pub points_written: u64,
    /// Failed write calls
    pub failed_writes: u64,
    /// Transitions into `Aborted`
    pub aborts: u64,
}

struct Timer {
    state: SchedulerState,
    handle: Option<AbortHandle>,
}

struct Shared<W> {
    writer: W,
    cache: PointCache,
    flush_interval: Duration,
    max_failed_attempts: u32,
    write_timeout: Option<Duration>,
    failed_attempts: AtomicU32,
    on_flush: Mutex<Option<FlushObserver>>,
    timer: Mutex<Timer>,
    /// Runtime that size-triggered writes are spawned on.
    runtime: Mutex<Option<Handle>>,
    stats: Mutex<SchedulerStats>,
}

impl<W: PointWriter> Shared<W> {
    /// Swap out the pending batch and notify the observer.
    ///
    /// Returns `None` when nothing is pending.
    fn begin_flush(&self) -> Option<Vec<Point>> {
        let batch = self.cache.take();
        if batch.is_empty() {
            return None;
        }

        let observer = self.on_flush.lock().clone();
        if let Some(observer) = observer {
            if catch_unwind(AssertUnwindSafe(|| observer(batch.as_slice()))).is_err() {
                warn!(
                    "on_flush observer panicked for a batch of {} points; writing anyway",
                    batch.len()
                );
            }
        }

        Some(batch)
    }

    /// Write a batch taken by `begin_flush` and apply the failure policy.
    async fn write_batch(&self, batch: Vec<Point>) -> FlushOutcome {
        let points = batch.len();
        debug!("Writing batch of {} points to InfluxDB", points);

        match self.write(batch).await {
            Ok(()) => {
                self.failed_attempts.store(0, Ordering::SeqCst);
                let mut stats = self.stats.lock();
                stats.batches_written += 1;
                stats.points_written += points as u64;
                FlushOutcome::Written { points }
            }
            Err(e) => {
                let consecutive = self.failed_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                self.stats.lock().failed_writes += 1;
                warn!("Failed to write points to InfluxDB: {}", e);

                if consecutive >= self.max_failed_attempts {
                    error!(
                        "Aborting writes to InfluxDB, has failed to write {} times",
                        consecutive
                    );
                    if self.abort() {
                        self.stats.lock().aborts += 1;
                    }
                    FlushOutcome::Aborted { consecutive }
                } else {
                    FlushOutcome::Failed { consecutive }
                }
            }
        }
    }

    async fn flush(&self) -> FlushOutcome {
        match self.begin_flush() {
            Some(batch) => self.write_batch(batch).await,
            None => FlushOutcome::Empty,
        }
    }

    async fn write(&self, batch: Vec<Point>) -> Result<()> {
        let write = self.writer.write_points(batch);
        match self.write_timeout {
            Some(limit) => match tokio::time::timeout(limit, write).await {
                Ok(result) => result.map_err(Error::WriteFailure),
                Err(_) => Err(Error::WriteTimeout(limit)),
            },
            None => write.await.map_err(Error::WriteFailure),
        }
    }

    /// Stop the timer after too many failures. Returns true on the
    /// `Running -> Aborted` transition.
    fn abort(&self) -> bool {
        let mut timer = self.timer.lock();
        if timer.state != SchedulerState::Running {
            return false;
        }
        if let Some(handle) = timer.handle.take() {
            handle.abort();
        }
        timer.state = SchedulerState::Aborted;
        true
    }
}

/// Timer loop. Holds only a weak reference so dropping the scheduler ends it.
async fn run_timer<W: PointWriter>(weak: Weak<Shared<W>>, start: Instant, period: Duration) {
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(shared) = weak.upgrade() else {
            break;
        };
        // Aborting the timer must not cancel an in-flight write.
        if let Some(batch) = shared.begin_flush() {
            tokio::spawn(async move {
                shared.write_batch(batch).await;
            });
        }
    }
}

/// Batching InfluxDB writer.
///
/// Caches points and hands them to the database client in batches, either
/// every `flush_interval` or as soon as `max_batch_size` points are pending.
/// After `max_failed_attempts` consecutive failed writes the periodic timer
/// is stopped until [`start_periodic_flush`](Self::start_periodic_flush) is
/// called again.
///
/// ```no_run
/// # use batching_influx::{BatchConfig, BatchingInflux, BoxError, Point, PointWriter};
/// # struct Client;
/// # #[async_trait::async_trait]
/// # impl PointWriter for Client {
/// #     async fn write_points(&self, _: Vec<Point>) -> Result<(), BoxError> { Ok(()) }
/// # }
/// # async fn run() -> batching_influx::Result<()> {
/// let influx = BatchingInflux::new(Client, BatchConfig::default())?;
/// influx.start_periodic_flush();
///
/// influx.add_point(Point::new("http_request").tag("route", "/").field("duration_ms", 12i64));
/// # Ok(())
/// # }
/// ```
pub struct BatchingInflux<W: PointWriter> {
    shared: Arc<Shared<W>>,
}

impl<W: PointWriter> BatchingInflux<W> {
    /// Wrap an existing database client.
    ///
    /// When called inside a tokio runtime, that runtime is remembered for
    /// size-triggered writes, so producers may call `add_point` from any
    /// thread.
    pub fn new(writer: W, config: BatchConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                writer,
                cache: PointCache::new(config.max_batch_size),
                flush_interval: config.flush_interval(),
                max_failed_attempts: config.max_failed_attempts,
                write_timeout: config.write_timeout(),
                failed_attempts: AtomicU32::new(0),
                on_flush: Mutex::new(None),
                timer: Mutex::new(Timer {
                    state: SchedulerState::Stopped,
                    handle: None,
                }),
                runtime: Mutex::new(Handle::try_current().ok()),
                stats: Mutex::new(SchedulerStats::default()),
            }),
        })
    }

    /// Build the database client from a connection string or parameters.
    ///
    /// Connection strings are parsed first; a malformed one fails with
    /// [`Error::MalformedConnectionString`].
    pub fn connect(target: impl Into<ConnectionTarget>, config: BatchConfig) -> Result<Self>
    where
        W: FromConnectionParams,
    {
        let params = target.into().resolve()?;
        debug!("Connecting to {}", params);
        let writer = W::from_params(params).map_err(Error::Connect)?;
        Self::new(writer, config)
    }

    /// Build from a loaded configuration file.
    pub fn from_config(config: InfluxConfig) -> Result<Self>
    where
        W: FromConnectionParams,
    {
        Self::connect(config.influxdb, config.batching)
    }

    /// Spawn size-triggered writes on `runtime`.
    ///
    /// Needed when the scheduler is built outside a runtime and fed from
    /// plain threads before `start_periodic_flush` is called.
    pub fn with_runtime(self, runtime: Handle) -> Self {
        *self.shared.runtime.lock() = Some(runtime);
        self
    }

    /// Register the pre-write observer.
    pub fn with_on_flush<F>(self, observer: F) -> Self
    where
        F: Fn(&[Point]) + Send + Sync + 'static,
    {
        self.set_on_flush(observer);
        self
    }

    /// Replace the pre-write observer.
    ///
    /// A panicking observer is logged and the write still happens.
    pub fn set_on_flush<F>(&self, observer: F)
    where
        F: Fn(&[Point]) + Send + Sync + 'static,
    {
        *self.shared.on_flush.lock() = Some(Arc::new(observer));
    }

    /// Start periodic flushing.
    ///
    /// Does nothing if already running. Restarting after an abort keeps the
    /// failure counter, so a single further failure aborts again.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start_periodic_flush(&self) -> &Self {
        let mut timer = self.shared.timer.lock();
        if timer.state == SchedulerState::Running {
            debug!("Periodic flush already running");
            return self;
        }

        *self.shared.runtime.lock() = Some(Handle::current());

        let period = self.shared.flush_interval;
        let first_tick = Instant::now() + period;
        let task = tokio::spawn(run_timer(Arc::downgrade(&self.shared), first_tick, period));
        timer.handle = Some(task.abort_handle());
        timer.state = SchedulerState::Running;

        info!("Started periodic flush to InfluxDB every {:?}", period);
        self
    }

    /// Stop periodic flushing. In-flight writes are not cancelled.
    pub fn stop_periodic_flush(&self) {
        let mut timer = self.shared.timer.lock();
        if let Some(handle) = timer.handle.take() {
            handle.abort();
        }
        if timer.state == SchedulerState::Running {
            info!("Stopped periodic flush to InfluxDB");
        }
        timer.state = SchedulerState::Stopped;
    }

    /// Queue a point.
    pub fn add_point(&self, point: Point) {
        self.add_points(std::iter::once(point));
    }

    /// Queue points in order.
    ///
    /// If the pending batch reaches `max_batch_size`, it is swapped out here
    /// and written in the background. Never waits for the write.
    pub fn add_points<I>(&self, points: I)
    where
        I: IntoIterator<Item = Point>,
    {
        if self.shared.cache.add(points) {
            self.flush_in_background();
        }
    }

    fn flush_in_background(&self) {
        let stored = self.shared.runtime.lock().clone();
        let Some(runtime) = stored.or_else(|| Handle::try_current().ok()) else {
            warn!(
                "Batch size reached outside a tokio runtime; {} points stay queued",
                self.shared.cache.len()
            );
            return;
        };

        if let Some(batch) = self.shared.begin_flush() {
            let shared = Arc::clone(&self.shared);
            runtime.spawn(async move {
                shared.write_batch(batch).await;
            });
        }
    }

    /// Write the pending batch now and wait for the outcome.
    ///
    /// Follows the same failure policy as timer-driven flushes.
    pub async fn flush(&self) -> FlushOutcome {
        self.shared.flush().await
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.timer.lock().state
    }

    /// Number of points waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.shared.cache.len()
    }

    /// Consecutive failed writes since the last success.
    pub fn failed_attempts(&self) -> u32 {
        self.shared.failed_attempts.load(Ordering::SeqCst)
    }

    pub fn max_batch_size(&self) -> usize {
        self.shared.cache.max_size()
    }

    /// Change the size threshold at runtime.
    pub fn set_max_batch_size(&self, max_batch_size: usize) {
        self.shared.cache.set_max_size(max_batch_size);
    }

    pub fn flush_interval(&self) -> Duration {
        self.shared.flush_interval
    }

    pub fn max_failed_attempts(&self) -> u32 {
        self.shared.max_failed_attempts
    }

    /// Get a snapshot of the statistics.
    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats.lock().clone()
    }

    /// Get a reference to the database client.
    pub fn writer(&self) -> &W {
        &self.shared.writer
    }
}

impl<W: PointWriter> Drop for BatchingInflux<W> {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.timer.lock().handle.take() {
            handle.abort();
        }
    }
}
