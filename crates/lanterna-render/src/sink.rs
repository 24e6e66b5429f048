use async_trait::async_trait;

use crate::sample::SampleBuffer;
use crate::time::MediaTime;

/// An opaque sample-buffer renderer (display layer, audio renderer).
///
/// The driver pulls frames while the sink signals readiness and hands them
/// over in PTS-monotonic order; an enqueued buffer belongs to the sink. The
/// sink outlives the driver that feeds it.
#[async_trait]
pub trait SampleSink: Send + Sync {
    /// Whether the sink wants more data right now.
    fn is_ready_for_more(&self) -> bool;

    /// Resolve when the sink wants to be fed again.
    async fn wait_ready(&self);

    /// Hand one buffer to the sink. Ownership transfers.
    fn enqueue_sample(&self, sample: SampleBuffer);

    /// Discard any buffered, not-yet-rendered samples.
    fn flush(&self);

    /// Stop asking for data.
    fn stop_requesting(&self);

    /// Current time on the sink's timebase.
    fn now(&self) -> MediaTime;

    /// Playback volume, meaningful for audio sinks only.
    fn set_volume(&self, _volume: f32) {}
}
