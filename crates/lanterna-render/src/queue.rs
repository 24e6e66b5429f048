use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::producer::{MediaAsset, SampleProducer};
use crate::sample::{MediaKind, SampleBuffer};
use crate::time::MediaTime;

/// Outcome of one [`RenderQueue::dequeue`] call.
#[derive(Debug)]
pub enum Dequeue {
    /// Session complete and everything drained.
    Finished,
    /// Nothing available right now; try again later.
    Waiting,
    /// Internal bookkeeping advanced; call again immediately.
    Skip,
    /// The next sample on the unified timeline.
    Frame(SampleBuffer),
}

struct QueueState {
    producers: Vec<SampleProducer>,
    pointer: usize,
    holding: VecDeque<SampleBuffer>,
    /// Unified-timeline time at which the current producer's output starts.
    last_producer_offset: MediaTime,
    /// Maximum unified-timeline PTS emitted from the current producer.
    last_frame_pts: MediaTime,
    complete: bool,
}

/// Multiplexes sample producers for successive segment files into a single
/// monotonic stream, rewriting presentation timestamps onto a continuous
/// timeline.
///
/// Producers are consumed strictly in append order. When a producer is
/// exhausted the next one's offset becomes the last *emitted* PTS, not the
/// segment's nominal duration, which absorbs small inter-segment drift.
pub struct RenderQueue {
    kind: MediaKind,
    state: Mutex<QueueState>,
}

impl RenderQueue {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            state: Mutex::new(QueueState {
                producers: Vec::new(),
                pointer: 0,
                holding: VecDeque::new(),
                last_producer_offset: MediaTime::ZERO,
                last_frame_pts: MediaTime::ZERO,
                complete: false,
            }),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Append a producer for the given asset. Append is the only mutation
    /// that happens outside the dequeue path.
    pub fn enqueue(&self, asset: Arc<dyn MediaAsset>, time_offset: MediaTime) {
        let producer = SampleProducer::new(asset, self.kind, time_offset);
        let mut state = self.state.lock();
        state.producers.push(producer);
        trace!(kind = ?self.kind, producers = state.producers.len(), "render queue: producer appended");
    }

    /// Latch completion: once drained, `dequeue` reports `Finished`.
    pub fn complete(&self) {
        self.state.lock().complete = true;
    }

    /// Pull the next frame for the sink whose clock reads `_target`.
    /// Emission is gated by sink readiness, not by comparing PTS against the
    /// target time.
    pub fn dequeue(&self, _target: MediaTime) -> Dequeue {
        let mut state = self.state.lock();

        if state.pointer >= state.producers.len() {
            if let Some(frame) = state.holding.pop_front() {
                return Dequeue::Frame(frame);
            }
            return if state.complete {
                Dequeue::Finished
            } else {
                Dequeue::Waiting
            };
        }

        if state.producers[state.pointer].is_finished() {
            state.pointer += 1;
            // The next producer starts where this one's output actually
            // ended. An empty producer must not rewind the timeline, hence
            // the max.
            state.last_producer_offset = state.last_producer_offset.max(state.last_frame_pts);
            state.last_frame_pts = MediaTime::ZERO;
            return Dequeue::Skip;
        }

        let pointer = state.pointer;
        let Some(sample) = state.producers[pointer].produce() else {
            return Dequeue::Skip;
        };
        if !sample.pts.is_valid() {
            return Dequeue::Skip;
        }

        // Rebase: express the producer offset in the buffer's timescale and
        // shift the raw PTS by it.
        let timescale = sample.pts.timescale();
        let offset = state.last_producer_offset.rescaled(timescale);
        let pts = MediaTime::new(sample.pts.value() + offset.value(), timescale);
        let sample = sample.with_pts(pts);

        if pts > state.last_frame_pts {
            state.last_frame_pts = pts;
        }
        state.holding.push_back(sample);

        match state.holding.pop_front() {
            Some(frame) => Dequeue::Frame(frame),
            None => Dequeue::Waiting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedAsset;

    fn drain(queue: &RenderQueue) -> Vec<f64> {
        let mut out = Vec::new();
        loop {
            match queue.dequeue(MediaTime::ZERO) {
                Dequeue::Frame(sample) => out.push(sample.pts.seconds()),
                Dequeue::Skip => continue,
                Dequeue::Waiting | Dequeue::Finished => break,
            }
        }
        out
    }

    #[test]
    fn rebases_pts_across_producers() {
        let queue = RenderQueue::new(MediaKind::Video);
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0, 1.0, 2.0], 600)),
            MediaTime::ZERO,
        );
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0, 1.0], 600)),
            MediaTime::ZERO,
        );
        queue.complete();

        let pts = drain(&queue);
        assert_eq!(pts, vec![0.0, 1.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn emitted_pts_are_monotonic_non_decreasing() {
        let queue = RenderQueue::new(MediaKind::Video);
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0, 0.5, 1.5], 600)),
            MediaTime::ZERO,
        );
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0, 0.7], 90_000)),
            MediaTime::ZERO,
        );
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0], 600)),
            MediaTime::ZERO,
        );
        queue.complete();

        let pts = drain(&queue);
        assert_eq!(pts.len(), 6);
        for pair in pts.windows(2) {
            assert!(pair[1] >= pair[0], "PTS went backwards: {pts:?}");
        }
    }

    #[test]
    fn waiting_until_complete_then_finished() {
        let queue = RenderQueue::new(MediaKind::Video);
        assert!(matches!(queue.dequeue(MediaTime::ZERO), Dequeue::Waiting));

        queue.complete();
        assert!(matches!(queue.dequeue(MediaTime::ZERO), Dequeue::Finished));
    }

    #[test]
    fn drains_holding_queue_after_last_producer() {
        let queue = RenderQueue::new(MediaKind::Video);
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0], 600)),
            MediaTime::ZERO,
        );
        queue.complete();

        let pts = drain(&queue);
        assert_eq!(pts, vec![0.0]);
        assert!(matches!(queue.dequeue(MediaTime::ZERO), Dequeue::Finished));
    }

    #[test]
    fn empty_producer_does_not_rewind_the_timeline() {
        let queue = RenderQueue::new(MediaKind::Video);
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0, 1.0], 600)),
            MediaTime::ZERO,
        );
        // No audio track: this producer finishes without emitting.
        queue.enqueue(
            Arc::new(ScriptedAsset::audio(&[], 600)),
            MediaTime::ZERO,
        );
        queue.enqueue(
            Arc::new(ScriptedAsset::video(&[0.0, 1.0], 600)),
            MediaTime::ZERO,
        );
        queue.complete();

        let pts = drain(&queue);
        assert_eq!(pts, vec![0.0, 1.0, 1.0, 2.0]);
    }
}
