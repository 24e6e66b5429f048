use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    error::FetchError,
    meter::BandwidthMeter,
    traits::Net,
    types::{Headers, RangeSpec},
};

/// Upper bound on post-completion drain rounds, so a consumer that stops
/// taking bytes cannot pin the pump task.
const MAX_DRAIN_ROUNDS: usize = 1024;

/// Exclusive view over a fetcher's buffered bytes, valid for the duration of
/// one callback invocation. The fetcher's lock is held while a `Consumer`
/// exists.
pub struct Consumer<'a> {
    buf: &'a mut BytesMut,
    offset: &'a mut u64,
}

impl Consumer<'_> {
    /// Remove and return exactly `n` prefix bytes, or `None` if fewer are
    /// buffered.
    pub fn take(&mut self, n: usize) -> Option<Bytes> {
        if self.buf.len() < n {
            return None;
        }
        *self.offset += n as u64;
        Some(self.buf.split_to(n).freeze())
    }

    /// Remove and return everything currently buffered. This is the
    /// whole-payload form used by file-mode processing.
    pub fn take_all(&mut self) -> Bytes {
        let n = self.buf.len();
        *self.offset += n as u64;
        self.buf.split_to(n).freeze()
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Absolute offset of the next buffered byte within the resource.
    pub fn offset(&self) -> u64 {
        *self.offset
    }
}

/// Callback registered against a fetcher. Invoked under the fetcher's lock
/// with a consumer over the shared buffer and the buffer head's absolute
/// offset. Must not call back into the same fetcher.
pub type PullFn = Box<dyn FnMut(&mut Consumer<'_>, u64) + Send>;

/// Error hook installed on a fetcher.
pub type ErrorFn = Box<dyn Fn(FetchError) + Send + Sync>;

/// Common surface of the streaming and file fetchers.
pub trait Fetcher: Send + Sync {
    /// Register a pull callback. Callbacks are invoked in registration order
    /// on every data arrival.
    fn register(&self, callback: PullFn);

    /// Install the error hook. Errors do not trigger retries; reporting is
    /// the extent of the contract.
    fn set_on_error(&self, callback: ErrorFn);

    /// Start (or restart) the transfer task.
    fn resume(&self);

    /// Best-effort cancellation; an in-flight callback may still run once.
    fn cancel(&self);

    /// True once the transfer finished and the tail was drained.
    fn is_finished(&self) -> bool;
}

struct PumpState {
    buf: BytesMut,
    offset: u64,
    callbacks: Vec<PullFn>,
}

struct FetchShared {
    state: Mutex<PumpState>,
    finished: AtomicBool,
    on_error: Mutex<Option<ErrorFn>>,
    cancel: CancellationToken,
}

impl FetchShared {
    fn new(start_offset: u64) -> Self {
        Self {
            state: Mutex::new(PumpState {
                buf: BytesMut::new(),
                offset: start_offset,
                callbacks: Vec::new(),
            }),
            finished: AtomicBool::new(false),
            on_error: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Run every callback once against the current buffer. Returns the
    /// number of bytes consumed across the round.
    fn run_callbacks(state: &mut PumpState) -> u64 {
        let before = state.offset;
        let mut callbacks = std::mem::take(&mut state.callbacks);
        for cb in callbacks.iter_mut() {
            let head = state.offset;
            let mut consumer = Consumer {
                buf: &mut state.buf,
                offset: &mut state.offset,
            };
            cb(&mut consumer, head);
        }
        state.callbacks = callbacks;
        state.offset - before
    }

    fn report(&self, err: FetchError) {
        if let Some(cb) = self.on_error.lock().as_ref() {
            cb(err);
        }
    }
}

/// Open-ended ranged GET that pushes arriving chunks into a shared buffer
/// and notifies registered consumers per arrival.
pub struct StreamingFetcher {
    url: Url,
    start_offset: u64,
    net: Arc<dyn Net>,
    meter: Arc<BandwidthMeter>,
    shared: Arc<FetchShared>,
}

impl StreamingFetcher {
    pub fn new(url: Url, start_offset: u64, net: Arc<dyn Net>, meter: Arc<BandwidthMeter>) -> Self {
        Self {
            url,
            start_offset,
            net,
            meter,
            shared: Arc::new(FetchShared::new(start_offset)),
        }
    }

    /// Absolute offset of the next unconsumed byte.
    pub fn current_offset(&self) -> u64 {
        self.shared.state.lock().offset
    }

    async fn pump(
        url: Url,
        start_offset: u64,
        net: Arc<dyn Net>,
        meter: Arc<BandwidthMeter>,
        shared: Arc<FetchShared>,
    ) {
        let opened = if start_offset > 0 {
            net.get_range(url.clone(), RangeSpec::from_start(start_offset), None)
                .await
        } else {
            // Range header omitted entirely at offset 0.
            net.stream(url.clone(), None).await
        };

        let mut stream = match opened {
            Ok(s) => s,
            Err(e) => {
                warn!(url = %url, error = %e, "streaming fetch: open failed");
                shared.report(e.into());
                shared.finished.store(true, Ordering::Release);
                return;
            }
        };

        let mut last_arrival = Instant::now();
        loop {
            let chunk = tokio::select! {
                _ = shared.cancel.cancelled() => {
                    trace!(url = %url, "streaming fetch: cancelled");
                    return;
                }
                chunk = stream.next() => chunk,
            };

            match chunk {
                None => break,
                Some(Err(e)) => {
                    warn!(url = %url, error = %e, "streaming fetch: stream error");
                    shared.report(e.into());
                    break;
                }
                Some(Ok(bytes)) => {
                    meter.add(last_arrival.elapsed(), bytes.len() as u64);
                    last_arrival = Instant::now();

                    let mut state = shared.state.lock();
                    state.buf.extend_from_slice(&bytes);
                    FetchShared::run_callbacks(&mut state);
                }
            }
        }

        // Drain the buffered tail with bounded rounds, yielding between
        // steps so one idle consumer cannot starve the runtime.
        for _ in 0..MAX_DRAIN_ROUNDS {
            {
                let mut state = shared.state.lock();
                if state.buf.is_empty() {
                    break;
                }
                if FetchShared::run_callbacks(&mut state) == 0 {
                    break;
                }
            }
            tokio::task::yield_now().await;
        }

        shared.finished.store(true, Ordering::Release);
        debug!(url = %url, "streaming fetch: finished");
    }
}

impl Fetcher for StreamingFetcher {
    fn register(&self, callback: PullFn) {
        self.shared.state.lock().callbacks.push(callback);
    }

    fn set_on_error(&self, callback: ErrorFn) {
        *self.shared.on_error.lock() = Some(callback);
    }

    fn resume(&self) {
        let url = self.url.clone();
        let net = Arc::clone(&self.net);
        let meter = Arc::clone(&self.meter);
        let shared = Arc::clone(&self.shared);
        let start_offset = self.start_offset;
        tokio::spawn(Self::pump(url, start_offset, net, meter, shared));
    }

    fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }
}

impl Drop for StreamingFetcher {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

/// Single closed-range GET delivering the whole payload in one callback
/// round. Admission is serialized through the session's semaphore so burst
/// segment loads do not contend on the network.
pub struct FileFetcher {
    url: Url,
    offset: u64,
    length: Option<u64>,
    net: Arc<dyn Net>,
    meter: Arc<BandwidthMeter>,
    admission: Arc<Semaphore>,
    shared: Arc<FetchShared>,
}

impl FileFetcher {
    pub fn new(
        url: Url,
        offset: u64,
        length: Option<u64>,
        net: Arc<dyn Net>,
        meter: Arc<BandwidthMeter>,
        admission: Arc<Semaphore>,
    ) -> Self {
        Self {
            url,
            offset,
            length,
            net,
            meter,
            admission,
            shared: Arc::new(FetchShared::new(offset)),
        }
    }

    fn range_headers(offset: u64, length: Option<u64>) -> Option<Headers> {
        let spec = match (offset, length) {
            (0, None) => return None,
            (o, Some(l)) => RangeSpec::with_length(o, l),
            (o, None) => RangeSpec::from_start(o),
        };
        let mut headers = Headers::new();
        headers.insert("Range", spec.to_header_value());
        Some(headers)
    }

    async fn load(
        url: Url,
        offset: u64,
        length: Option<u64>,
        net: Arc<dyn Net>,
        meter: Arc<BandwidthMeter>,
        admission: Arc<Semaphore>,
        shared: Arc<FetchShared>,
    ) {
        let Ok(_permit) = admission.acquire_owned().await else {
            return;
        };
        if shared.cancel.is_cancelled() {
            return;
        }

        let headers = Self::range_headers(offset, length);
        let started = Instant::now();
        let fetched = tokio::select! {
            _ = shared.cancel.cancelled() => {
                trace!(url = %url, "file fetch: cancelled");
                return;
            }
            fetched = net.get_bytes(url.clone(), headers) => fetched,
        };

        let payload = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "file fetch: request failed");
                shared.report(e.into());
                shared.finished.store(true, Ordering::Release);
                return;
            }
        };

        meter.add(started.elapsed(), payload.len() as u64);
        trace!(url = %url, offset, bytes = payload.len(), "file fetch: payload ready");

        let mut state = shared.state.lock();
        state.buf.extend_from_slice(&payload);
        FetchShared::run_callbacks(&mut state);
        drop(state);

        shared.finished.store(true, Ordering::Release);
    }
}

impl Fetcher for FileFetcher {
    fn register(&self, callback: PullFn) {
        self.shared.state.lock().callbacks.push(callback);
    }

    fn set_on_error(&self, callback: ErrorFn) {
        *self.shared.on_error.lock() = Some(callback);
    }

    fn resume(&self) {
        let url = self.url.clone();
        let net = Arc::clone(&self.net);
        let meter = Arc::clone(&self.meter);
        let admission = Arc::clone(&self.admission);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(Self::load(
            url,
            self.offset,
            self.length,
            net,
            meter,
            admission,
            shared,
        ));
    }

    fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }
}

impl Drop for FileFetcher {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}
