//! The segment download session.
//!
//! Given a media playlist and a seek time, the session plans which chunks
//! (initialization sections + segments) must be fetched, deduplicates
//! fetchers per [`SessionKey`] and chunks per `BytesKey`, assembles each
//! segment with its init section prepended, writes the result to the blob
//! store and emits ordered completion events.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use bytes::{Bytes, BytesMut};
use lanterna_net::{BandwidthMeter, Fetcher, FileFetcher, Net, PullFn, StreamingFetcher};
use lanterna_storage::{BlobStore, BytesKey, url_hash};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::LoaderError;
use crate::keys::SessionKey;
use crate::playlist::MediaPlaylist;

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// One completed segment, ready for rendering.
#[derive(Clone, Debug)]
pub struct SegmentReady {
    pub index: usize,
    pub file_url: PathBuf,
    pub presentation_offset: f64,
    pub duration: f64,
}

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Use one shared streaming fetcher per URL for byte-ranged segments.
    /// Requires the server to support ranges (the loader probes this).
    pub use_ranged_streaming: bool,

    /// Override the generated session id (blob filename component).
    pub session_id: Option<String>,
}

#[derive(Clone, Debug)]
enum ChunkKind {
    Init,
    Segment {
        index: usize,
        init_key: Option<BytesKey>,
    },
}

/// A chunk's bytes, as delivered by a fetcher callback.
struct LoadedChunk {
    key: BytesKey,
    kind: ChunkKind,
    url: Url,
    offset: u64,
    bytes: Bytes,
}

struct ChunkPlan {
    key: BytesKey,
    url: Url,
    offset: u64,
    length: Option<u64>,
    streamed: bool,
    kind: ChunkKind,
}

pub struct DownloadSession {
    inner: Arc<SessionInner>,
    completions_rx: Mutex<Option<mpsc::UnboundedReceiver<SegmentReady>>>,
    chunks_rx: Mutex<Option<mpsc::UnboundedReceiver<LoadedChunk>>>,
    cached: Vec<SegmentReady>,
}

struct SessionInner {
    session_id: String,
    store: BlobStore,
    skip_count: usize,
    durations: Vec<f64>,
    offsets: Vec<f64>,
    fetchers: Mutex<HashMap<SessionKey, Arc<dyn Fetcher>>>,
    completions_tx: mpsc::UnboundedSender<SegmentReady>,
    cancel: CancellationToken,
    started: AtomicBool,
}

fn resolve(base: &Url, uri: &str) -> Result<Url, LoaderError> {
    if uri.contains("://") {
        return Url::parse(uri).map_err(|e| LoaderError::InvalidUrl(format!("{uri}: {e}")));
    }
    base.join(uri)
        .map_err(|e| LoaderError::InvalidUrl(format!("{uri}: {e}")))
}

/// Leading segments whose cumulative duration ends at or before `seek_time`.
/// The first segment whose range straddles the seek time is kept.
fn compute_skip(durations: &[f64], seek_time: f64) -> usize {
    let mut acc = 0.0;
    let mut skip = 0;
    for d in durations {
        if acc + d <= seek_time {
            acc += d;
            skip += 1;
        } else {
            break;
        }
    }
    skip
}

impl DownloadSession {
    pub fn new(
        playlist: &MediaPlaylist,
        base_url: &Url,
        seek_time: f64,
        net: Arc<dyn Net>,
        meter: Arc<BandwidthMeter>,
        store: BlobStore,
        options: SessionOptions,
    ) -> Result<Self, LoaderError> {
        let durations: Vec<f64> = (0..playlist.segments.len())
            .map(|i| playlist.segment_duration(i))
            .collect();
        let offsets: Vec<f64> = durations
            .iter()
            .scan(0.0, |acc, d| {
                let here = *acc;
                *acc += d;
                Some(here)
            })
            .collect();
        let skip_count = compute_skip(&durations, seek_time);

        let session_id = options.session_id.clone().unwrap_or_else(|| {
            let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
            format!("{}{}", &url_hash(base_url)[..8], seq)
        });

        // Resolve byte ranges for the whole playlist first: a range without
        // an offset continues the previous range on the same URI.
        let mut next_range_end: HashMap<&str, u64> = HashMap::new();
        let mut resolved_ranges: Vec<Option<(u64, u64)>> = Vec::new();
        for segment in &playlist.segments {
            let resolved = segment.byte_range.map(|range| {
                let offset = range
                    .offset
                    .unwrap_or_else(|| *next_range_end.get(segment.uri.as_str()).unwrap_or(&0));
                next_range_end.insert(segment.uri.as_str(), offset + range.length);
                (offset, range.length)
            });
            resolved_ranges.push(resolved);
        }

        let loaded_chunks = Arc::new(Mutex::new(HashSet::new()));
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (chunk_tx, chunks_rx) = mpsc::unbounded_channel::<LoadedChunk>();

        // Plan every chunk to load, init sections first so their callbacks
        // sit ahead of segment callbacks on shared streaming fetchers.
        let mut plans: Vec<ChunkPlan> = Vec::new();
        let mut planned: HashSet<BytesKey> = HashSet::new();
        let mut cached: Vec<SegmentReady> = Vec::new();

        for (index, segment) in playlist.segments.iter().enumerate().skip(skip_count) {
            let range = resolved_ranges[index];
            let (seg_offset, seg_length) = match range {
                Some((o, l)) => (o, Some(l)),
                None => (0, None),
            };
            let seg_key = BytesKey::new(&segment.uri, seg_offset, seg_length);

            if let Some(path) = store.lookup(&seg_key) {
                trace!(index, key = ?seg_key, "session: segment already in blob store");
                loaded_chunks.lock().insert(seg_key);
                cached.push(SegmentReady {
                    index,
                    file_url: path,
                    presentation_offset: offsets[index],
                    duration: durations[index],
                });
                continue;
            }

            let streamed = range.is_some() && options.use_ranged_streaming;

            let init_key = match &segment.init_section {
                Some(init) => {
                    let (offset, length) = match init.byte_range {
                        Some(r) => (r.offset.unwrap_or(0), Some(r.length)),
                        None => (0, None),
                    };
                    let key = BytesKey::new(&init.uri, offset, length);
                    if planned.insert(key.clone()) {
                        plans.push(ChunkPlan {
                            key: key.clone(),
                            url: resolve(base_url, &init.uri)?,
                            offset,
                            length,
                            streamed: streamed && init.byte_range.is_some(),
                            kind: ChunkKind::Init,
                        });
                    }
                    Some(key)
                }
                None => None,
            };

            if planned.insert(seg_key.clone()) {
                plans.push(ChunkPlan {
                    key: seg_key,
                    url: resolve(base_url, &segment.uri)?,
                    offset: seg_offset,
                    length: seg_length,
                    streamed,
                    kind: ChunkKind::Segment { index, init_key },
                });
            }
        }

        // Materialize fetchers, sharing streaming fetchers per URL.
        let admission = Arc::new(Semaphore::new(1));
        let mut fetchers: HashMap<SessionKey, Arc<dyn Fetcher>> = HashMap::new();
        let mut prev_streamed: HashMap<Url, BytesKey> = HashMap::new();

        for plan in plans {
            let session_key = if plan.streamed {
                SessionKey::streaming(plan.url.clone())
            } else {
                SessionKey::file(plan.url.clone(), plan.offset)
            };

            let fetcher = fetchers
                .entry(session_key)
                .or_insert_with(|| {
                    let fetcher: Arc<dyn Fetcher> = if plan.streamed {
                        Arc::new(StreamingFetcher::new(
                            plan.url.clone(),
                            plan.offset,
                            Arc::clone(&net),
                            Arc::clone(&meter),
                        ))
                    } else {
                        Arc::new(FileFetcher::new(
                            plan.url.clone(),
                            plan.offset,
                            plan.length,
                            Arc::clone(&net),
                            Arc::clone(&meter),
                            Arc::clone(&admission),
                        ))
                    };
                    let url = plan.url.clone();
                    fetcher.set_on_error(Box::new(move |e| {
                        // No automatic retry: report and drop.
                        warn!(url = %url, error = %e, "session: fetch failed");
                    }));
                    fetcher
                })
                .clone();

            let callback = if plan.streamed {
                let prev_key = prev_streamed.insert(plan.url.clone(), plan.key.clone());
                Self::streamed_callback(&plan, prev_key, &loaded_chunks, &chunk_tx)
            } else {
                Self::file_callback(&plan, &loaded_chunks, &chunk_tx)
            };
            fetcher.register(callback);
        }

        let inner = Arc::new(SessionInner {
            session_id,
            store,
            skip_count,
            durations,
            offsets,
            fetchers: Mutex::new(fetchers),
            completions_tx,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        });

        Ok(Self {
            inner,
            completions_rx: Mutex::new(Some(completions_rx)),
            chunks_rx: Mutex::new(Some(chunks_rx)),
            cached,
        })
    }

    /// Stream-mode callback: discard up to the chunk's offset, then consume
    /// exactly its length. Stops short when the chunk is already loaded, so
    /// repeated invocations are idempotent. Buffered bytes below this
    /// chunk's offset still belong to the preceding chunk until that chunk
    /// is loaded, so consumption waits on `prev_key`.
    fn streamed_callback(
        plan: &ChunkPlan,
        prev_key: Option<BytesKey>,
        loaded: &Arc<Mutex<HashSet<BytesKey>>>,
        tx: &mpsc::UnboundedSender<LoadedChunk>,
    ) -> PullFn {
        let loaded = Arc::clone(loaded);
        let tx = tx.clone();
        let key = plan.key.clone();
        let kind = plan.kind.clone();
        let url = plan.url.clone();
        let target_offset = plan.offset;
        let length = plan.length.expect("stream mode always carries a length") as usize;

        Box::new(move |consumer, _current| {
            {
                let loaded = loaded.lock();
                if loaded.contains(&key) {
                    return;
                }
                if let Some(prev) = &prev_key {
                    if !loaded.contains(prev) {
                        return;
                    }
                }
            }
            while consumer.offset() < target_offset {
                let gap = (target_offset - consumer.offset()) as usize;
                let n = gap.min(consumer.buffered());
                if n == 0 {
                    return;
                }
                consumer.take(n);
            }
            let Some(bytes) = consumer.take(length) else {
                return;
            };
            if loaded.lock().insert(key.clone()) {
                let _ = tx.send(LoadedChunk {
                    key: key.clone(),
                    kind: kind.clone(),
                    url: url.clone(),
                    offset: target_offset,
                    bytes,
                });
            }
        })
    }

    /// File-mode callback: the single invocation carries the whole payload.
    fn file_callback(
        plan: &ChunkPlan,
        loaded: &Arc<Mutex<HashSet<BytesKey>>>,
        tx: &mpsc::UnboundedSender<LoadedChunk>,
    ) -> PullFn {
        let loaded = Arc::clone(loaded);
        let tx = tx.clone();
        let key = plan.key.clone();
        let kind = plan.kind.clone();
        let url = plan.url.clone();
        let offset = plan.offset;

        Box::new(move |consumer, _current| {
            let bytes = consumer.take_all();
            if bytes.is_empty() {
                return;
            }
            if loaded.lock().insert(key.clone()) {
                let _ = tx.send(LoadedChunk {
                    key: key.clone(),
                    kind: kind.clone(),
                    url: url.clone(),
                    offset,
                    bytes,
                });
            }
        })
    }

    /// Index of the first segment the session downloads.
    pub fn skip_count(&self) -> usize {
        self.inner.skip_count
    }

    /// Presentation offset of segment `index` on the playlist timeline.
    pub fn presentation_offset(&self, index: usize) -> f64 {
        self.inner.offsets[index]
    }

    pub fn segment_duration(&self, index: usize) -> f64 {
        self.inner.durations[index]
    }

    /// The ordered completion stream. Can be taken once.
    pub fn take_completions(&self) -> Option<mpsc::UnboundedReceiver<SegmentReady>> {
        self.completions_rx.lock().take()
    }

    /// Emit cached completions, spawn the assembly task and resume every
    /// fetcher.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }

        for ready in &self.cached {
            let _ = self.inner.completions_tx.send(ready.clone());
        }

        if let Some(chunks_rx) = self.chunks_rx.lock().take() {
            tokio::spawn(Self::assemble(Arc::clone(&self.inner), chunks_rx));
        }

        let fetchers = self.inner.fetchers.lock();
        debug!(
            session_id = %self.inner.session_id,
            fetchers = fetchers.len(),
            skip = self.inner.skip_count,
            "session: starting"
        );
        for fetcher in fetchers.values() {
            fetcher.resume();
        }
    }

    /// Cancel outstanding fetchers. In-flight callbacks may still fire once;
    /// the loaded-chunks set keeps them idempotent.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        for fetcher in self.inner.fetchers.lock().values() {
            fetcher.cancel();
        }
    }

    /// Assembly task: receives loaded chunks, retains init-section bytes,
    /// prepends them to their segments, writes blobs and emits completions.
    /// Segments whose init section has not arrived yet are parked until it
    /// does.
    async fn assemble(inner: Arc<SessionInner>, mut rx: mpsc::UnboundedReceiver<LoadedChunk>) {
        let mut init_bytes: HashMap<BytesKey, Bytes> = HashMap::new();
        let mut parked: HashMap<BytesKey, Vec<LoadedChunk>> = HashMap::new();

        loop {
            let chunk = tokio::select! {
                _ = inner.cancel.cancelled() => return,
                chunk = rx.recv() => match chunk {
                    Some(c) => c,
                    None => return,
                },
            };

            match chunk.kind.clone() {
                ChunkKind::Init => {
                    trace!(key = ?chunk.key, bytes = chunk.bytes.len(), "session: init section ready");
                    init_bytes.insert(chunk.key.clone(), chunk.bytes.clone());
                    if let Some(waiters) = parked.remove(&chunk.key) {
                        for seg in waiters {
                            inner.emit_segment(seg, &init_bytes).await;
                        }
                    }
                }
                ChunkKind::Segment { ref init_key, .. } => match init_key {
                    Some(k) if !init_bytes.contains_key(k) => {
                        parked.entry(k.clone()).or_default().push(chunk);
                    }
                    _ => inner.emit_segment(chunk, &init_bytes).await,
                },
            }
        }
    }
}

impl SessionInner {
    async fn emit_segment(&self, chunk: LoadedChunk, init_bytes: &HashMap<BytesKey, Bytes>) {
        let ChunkKind::Segment { index, init_key } = chunk.kind else {
            return;
        };

        let init = init_key.as_ref().and_then(|k| init_bytes.get(k));
        let total = init.map_or(0, |b| b.len()) + chunk.bytes.len();
        let mut data = BytesMut::with_capacity(total);
        if let Some(init) = init {
            data.extend_from_slice(init);
        }
        data.extend_from_slice(&chunk.bytes);

        let length = chunk.key.length.unwrap_or(chunk.bytes.len() as u64);
        let filename = format!(
            "{}_{}_{}_{}_{}.mp4",
            self.session_id,
            url_hash(&chunk.url),
            index,
            chunk.offset,
            length
        );

        match self.store.put(chunk.key.clone(), &filename, &data).await {
            Ok(path) => {
                debug!(index, path = %path.display(), bytes = total, "session: segment assembled");
                let _ = self.completions_tx.send(SegmentReady {
                    index,
                    file_url: path,
                    presentation_offset: self.offsets[index],
                    duration: self.durations[index],
                });
            }
            Err(e) => {
                warn!(index, error = %e, "session: blob write failed");
            }
        }
    }
}

impl Drop for DownloadSession {
    fn drop(&mut self) {
        self.stop();
    }
}
