use std::time::Duration;

use url::Url;

#[derive(Clone, Debug)]
pub struct PlayerOptions {
    /// The top-level (master) manifest URL.
    pub master_url: Url,

    /// A waiting interval at least this long triggers an automatic
    /// resolution downshift.
    pub stall_downshift_threshold: Duration,

    /// Rendition height preferred at startup.
    pub preferred_height: u32,

    /// Render-driver back-pressure sleep.
    pub poll_interval: Duration,
}

impl PlayerOptions {
    pub fn new(master_url: Url) -> Self {
        Self {
            master_url,
            stall_downshift_threshold: Duration::from_secs(4),
            preferred_height: 720,
            poll_interval: Duration::from_millis(10),
        }
    }
}
