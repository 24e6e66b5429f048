use bytes::Bytes;

use crate::time::MediaTime;

/// Which track of an asset a producer or queue handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// One media unit (compressed or decoded) with its presentation timestamp.
///
/// Owned by the render queue from production until dequeue; once handed to a
/// sink, the sink owns it.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    pub kind: MediaKind,
    pub pts: MediaTime,
    pub duration: Option<MediaTime>,
    pub data: Bytes,
}

impl SampleBuffer {
    pub fn new(kind: MediaKind, pts: MediaTime, data: Bytes) -> Self {
        Self {
            kind,
            pts,
            duration: None,
            data,
        }
    }

    /// The same buffer restamped with a new presentation time.
    #[must_use]
    pub fn with_pts(mut self, pts: MediaTime) -> Self {
        self.pts = pts;
        self
    }
}
