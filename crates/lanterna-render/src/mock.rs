//! Test doubles for the rendering seams: scripted assets and a collecting
//! sink. Used by this crate's tests and by the player crate's.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::clock::PresentationClock;
use crate::producer::{MediaAsset, ProducerError, TrackReader};
use crate::sample::{MediaKind, SampleBuffer};
use crate::sink::SampleSink;
use crate::time::MediaTime;

/// An asset whose tracks are fixed lists of raw PTS values (in seconds).
pub struct ScriptedAsset {
    timescale: i32,
    video_pts: Option<Vec<f64>>,
    audio_pts: Option<Vec<f64>>,
}

impl ScriptedAsset {
    pub fn video(pts: &[f64], timescale: i32) -> Self {
        Self {
            timescale,
            video_pts: Some(pts.to_vec()),
            audio_pts: None,
        }
    }

    pub fn audio(pts: &[f64], timescale: i32) -> Self {
        Self {
            timescale,
            video_pts: None,
            audio_pts: Some(pts.to_vec()),
        }
    }

    pub fn muxed(video_pts: &[f64], audio_pts: &[f64], timescale: i32) -> Self {
        Self {
            timescale,
            video_pts: Some(video_pts.to_vec()),
            audio_pts: Some(audio_pts.to_vec()),
        }
    }
}

struct ScriptedReader {
    kind: MediaKind,
    timescale: i32,
    pts: std::vec::IntoIter<f64>,
}

impl TrackReader for ScriptedReader {
    fn next_sample(&mut self) -> Option<SampleBuffer> {
        let pts = self.pts.next()?;
        Some(SampleBuffer::new(
            self.kind,
            MediaTime::with_seconds(pts, self.timescale),
            Bytes::from(format!("sample@{pts}")),
        ))
    }
}

impl MediaAsset for ScriptedAsset {
    fn reader(
        &self,
        kind: MediaKind,
        from: MediaTime,
    ) -> Result<Box<dyn TrackReader>, ProducerError> {
        let track = match kind {
            MediaKind::Video => self.video_pts.as_ref(),
            MediaKind::Audio => self.audio_pts.as_ref(),
        }
        .ok_or(ProducerError::NoMatchingTrack)?;

        let start = from.seconds();
        let pts: Vec<f64> = track.iter().copied().filter(|p| *p >= start).collect();
        Ok(Box::new(ScriptedReader {
            kind,
            timescale: self.timescale,
            pts: pts.into_iter(),
        }))
    }
}

/// A sink that accepts everything and records what it was fed.
pub struct CollectingSink {
    clock: Arc<PresentationClock>,
    samples: Mutex<Vec<SampleBuffer>>,
    flushed: Mutex<bool>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(PresentationClock::new()))
    }

    pub fn with_clock(clock: Arc<PresentationClock>) -> Self {
        Self {
            clock,
            samples: Mutex::new(Vec::new()),
            flushed: Mutex::new(false),
        }
    }

    pub fn pts_seconds(&self) -> Vec<f64> {
        self.samples.lock().iter().map(|s| s.pts.seconds()).collect()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn was_flushed(&self) -> bool {
        *self.flushed.lock()
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleSink for CollectingSink {
    fn is_ready_for_more(&self) -> bool {
        true
    }

    async fn wait_ready(&self) {
        tokio::task::yield_now().await;
    }

    fn enqueue_sample(&self, sample: SampleBuffer) {
        self.samples.lock().push(sample);
    }

    fn flush(&self) {
        *self.flushed.lock() = true;
        self.samples.lock().clear();
    }

    fn stop_requesting(&self) {}

    fn now(&self) -> MediaTime {
        self.clock.now()
    }
}
