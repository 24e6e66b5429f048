#![forbid(unsafe_code)]

//! Rendering side of the engine: sample buffers with rational timestamps,
//! producers reading one track of a media asset, the render queue that
//! splices successive producers onto one continuous timeline, and the
//! driver that pumps a sample sink.

mod clock;
mod driver;
pub mod mock;
mod producer;
mod queue;
mod sample;
mod sink;
mod time;

pub use clock::PresentationClock;
pub use driver::{DriverOptions, RenderDriver, RenderStatus, StallFn, StatusFn};
pub use producer::{MediaAsset, ProducerError, SampleProducer, TrackReader};
pub use queue::{Dequeue, RenderQueue};
pub use sample::{MediaKind, SampleBuffer};
pub use sink::SampleSink;
pub use time::MediaTime;
