use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::sample::{MediaKind, SampleBuffer};
use crate::time::MediaTime;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProducerError {
    #[error("asset cannot be opened")]
    AssetUnopenable,

    #[error("no track matches the requested media type")]
    NoMatchingTrack,
}

/// Sequential sample reader over one track of one asset.
pub trait TrackReader: Send {
    /// Next sample in decode order, `None` at end of stream.
    fn next_sample(&mut self) -> Option<SampleBuffer>;
}

/// A decoded media asset — the external collaborator behind every segment
/// file. Opening a reader selects the first track of the requested kind in
/// its native output format; no transcoding happens here.
pub trait MediaAsset: Send + Sync {
    fn reader(
        &self,
        kind: MediaKind,
        from: MediaTime,
    ) -> Result<Box<dyn TrackReader>, ProducerError>;
}

/// Wraps one asset and yields its samples of one media kind sequentially.
///
/// Reading starts lazily on the first `produce` call. `None` means either
/// "not ready" or "end of stream"; callers distinguish the two through
/// [`is_finished`](Self::is_finished).
pub struct SampleProducer {
    asset: Arc<dyn MediaAsset>,
    kind: MediaKind,
    time_offset: MediaTime,
    reader: Option<Box<dyn TrackReader>>,
    started: bool,
    finished: bool,
}

impl SampleProducer {
    pub fn new(asset: Arc<dyn MediaAsset>, kind: MediaKind, time_offset: MediaTime) -> Self {
        Self {
            asset,
            kind,
            time_offset,
            reader: None,
            started: false,
            finished: false,
        }
    }

    pub fn produce(&mut self) -> Option<SampleBuffer> {
        if self.finished {
            return None;
        }

        if !self.started {
            self.started = true;
            match self.asset.reader(self.kind, self.time_offset) {
                Ok(reader) => self.reader = Some(reader),
                Err(e) => {
                    // Surfaced as a null sample; the queue advances past the
                    // broken asset instead of stalling on it.
                    warn!(kind = ?self.kind, error = %e, "producer: failed to open asset");
                    self.finished = true;
                    return None;
                }
            }
        }

        let reader = self.reader.as_mut()?;
        match reader.next_sample() {
            Some(sample) => Some(sample),
            None => {
                self.finished = true;
                // End of stream cancels the reader.
                self.reader = None;
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
