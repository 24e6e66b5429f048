use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::queue::{Dequeue, RenderQueue};
use crate::sample::MediaKind;
use crate::sink::SampleSink;

/// Driver status, reported on transitions only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStatus {
    Playing,
    Finished,
    Waiting,
}

pub type StatusFn = Box<dyn Fn(RenderStatus) + Send + Sync>;
pub type StallFn = Box<dyn Fn(Duration) + Send + Sync>;

#[derive(Clone, Debug)]
pub struct DriverOptions {
    /// Back-pressure sleep while the queue has nothing to offer.
    pub poll_interval: Duration,

    /// Report an open waiting interval once it exceeds this, even before a
    /// frame arrives to close it. This is what lets a hard stall trigger a
    /// resolution downshift.
    pub stall_threshold: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            stall_threshold: Duration::from_secs(4),
        }
    }
}

/// Generic pump between a render queue and one sample sink.
///
/// Pulls frames while the sink is ready, rewrites nothing (the queue already
/// emits unified timestamps) and tracks waiting intervals with wall-clock
/// time.
pub struct RenderDriver {
    queue: Arc<RenderQueue>,
    sink: Arc<dyn SampleSink>,
    options: DriverOptions,
    cancel: CancellationToken,
}

impl RenderDriver {
    pub fn new(kind: MediaKind, sink: Arc<dyn SampleSink>, options: DriverOptions) -> Self {
        Self {
            queue: Arc::new(RenderQueue::new(kind)),
            sink,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// The queue this driver consumes. The player appends producers here in
    /// segment index order.
    pub fn queue(&self) -> Arc<RenderQueue> {
        Arc::clone(&self.queue)
    }

    /// Spawn the pull loop.
    pub fn start(&self, on_status: Option<StatusFn>, on_stall: Option<StallFn>) {
        let queue = Arc::clone(&self.queue);
        let sink = Arc::clone(&self.sink);
        let options = self.options.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(Self::pump(queue, sink, options, cancel, on_status, on_stall));
    }

    async fn pump(
        queue: Arc<RenderQueue>,
        sink: Arc<dyn SampleSink>,
        options: DriverOptions,
        cancel: CancellationToken,
        on_status: Option<StatusFn>,
        on_stall: Option<StallFn>,
    ) {
        let mut status: Option<RenderStatus> = None;
        let mut waiting_since: Option<Instant> = None;
        let mut stall_reported = false;

        let mut transition = |next: RenderStatus| {
            if status != Some(next) {
                trace!(kind = ?queue.kind(), status = ?next, "render driver: status");
                status = Some(next);
                if let Some(cb) = &on_status {
                    cb(next);
                }
            }
        };

        loop {
            if cancel.is_cancelled() {
                return;
            }
            if !sink.is_ready_for_more() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sink.wait_ready() => {}
                }
                continue;
            }

            match queue.dequeue(sink.now()) {
                Dequeue::Finished => {
                    transition(RenderStatus::Finished);
                    debug!(kind = ?queue.kind(), "render driver: finished");
                    return;
                }
                Dequeue::Frame(sample) => {
                    transition(RenderStatus::Playing);
                    if let Some(started) = waiting_since.take() {
                        if !stall_reported {
                            if let Some(cb) = &on_stall {
                                cb(started.elapsed());
                            }
                        }
                        stall_reported = false;
                    }
                    sink.enqueue_sample(sample);
                }
                Dequeue::Skip => continue,
                Dequeue::Waiting => {
                    transition(RenderStatus::Waiting);
                    let started = *waiting_since.get_or_insert_with(Instant::now);
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(options.poll_interval) => {}
                    }
                    if !stall_reported && started.elapsed() >= options.stall_threshold {
                        stall_reported = true;
                        if let Some(cb) = &on_stall {
                            cb(started.elapsed());
                        }
                    }
                }
            }
        }
    }

    /// Mark the queue complete; the driver finishes once it drains.
    pub fn complete(&self) {
        self.queue.complete();
    }

    /// Complete the queue, flush the sink and stop pulling.
    pub fn stop(&self) {
        self.queue.complete();
        self.sink.flush();
        self.sink.stop_requesting();
        self.cancel.cancel();
    }
}

impl Drop for RenderDriver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::mock::{CollectingSink, ScriptedAsset};
    use crate::time::MediaTime;

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn driver_feeds_sink_with_monotonic_pts() {
        let sink = Arc::new(CollectingSink::new());
        let driver = RenderDriver::new(
            MediaKind::Video,
            sink.clone(),
            DriverOptions::default(),
        );

        let queue = driver.queue();
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0, 1.0, 2.0], 600)),
            MediaTime::ZERO,
        );
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0, 1.0], 600)),
            MediaTime::ZERO,
        );
        queue.complete();

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let statuses2 = Arc::clone(&statuses);
        driver.start(
            Some(Box::new(move |s| statuses2.lock().push(s))),
            None,
        );

        wait_for(|| statuses.lock().contains(&RenderStatus::Finished)).await;

        let pts = sink.pts_seconds();
        assert_eq!(pts, vec![0.0, 1.0, 2.0, 2.0, 3.0]);
        for pair in pts.windows(2) {
            assert!(pair[1] >= pair[0]);
        }

        // Status transitions are deduplicated.
        let statuses = statuses.lock();
        assert_eq!(
            statuses.as_slice(),
            &[RenderStatus::Playing, RenderStatus::Finished]
        );
    }

    #[tokio::test]
    async fn starving_driver_reports_waiting_then_stall() {
        let sink = Arc::new(CollectingSink::new());
        let options = DriverOptions {
            poll_interval: Duration::from_millis(5),
            stall_threshold: Duration::from_millis(50),
        };
        let driver = RenderDriver::new(MediaKind::Video, sink.clone(), options);

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let stalls = Arc::new(Mutex::new(Vec::new()));
        let statuses2 = Arc::clone(&statuses);
        let stalls2 = Arc::clone(&stalls);
        driver.start(
            Some(Box::new(move |s| statuses2.lock().push(s))),
            Some(Box::new(move |d| stalls2.lock().push(d))),
        );

        // No producers: the driver starves and must report the open
        // interval once it crosses the threshold.
        wait_for(|| !stalls.lock().is_empty()).await;

        assert_eq!(statuses.lock().first(), Some(&RenderStatus::Waiting));
        let stall = stalls.lock()[0];
        assert!(stall >= Duration::from_millis(50));

        driver.stop();
    }

    #[tokio::test]
    async fn short_wait_reports_interval_on_close() {
        let sink = Arc::new(CollectingSink::new());
        let options = DriverOptions {
            poll_interval: Duration::from_millis(5),
            stall_threshold: Duration::from_secs(4),
        };
        let driver = RenderDriver::new(MediaKind::Video, sink.clone(), options);
        let queue = driver.queue();

        let stalls = Arc::new(Mutex::new(Vec::new()));
        let stalls2 = Arc::clone(&stalls);
        driver.start(None, Some(Box::new(move |d| stalls2.lock().push(d))));

        // Let it starve briefly, then feed it.
        tokio::time::sleep(Duration::from_millis(40)).await;
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0], 600)),
            MediaTime::ZERO,
        );
        queue.complete();

        wait_for(|| !sink.pts_seconds().is_empty()).await;

        // The interval closed under the threshold: exactly one report with
        // its wall-clock duration.
        let stalls = stalls.lock();
        assert_eq!(stalls.len(), 1);
        assert!(stalls[0] >= Duration::from_millis(30));
        assert!(stalls[0] < Duration::from_secs(4));
    }
}
