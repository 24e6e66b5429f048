use std::time::Duration;

/// Coarse playback state, derived from the video driver's status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerStatus {
    Playing,
    Finished,
    Buffering,
}

/// Events emitted by the player for UI and monitoring.
#[derive(Clone, Debug)]
pub enum PlayerEvent {
    Status(PlayerStatus),
    /// A waiting interval ended or crossed the stall threshold.
    Stalled { duration: Duration },
    /// The active rendition changed (manual selection or ABR downshift).
    ResolutionChanged { resolution: String },
    Error { message: String },
}
