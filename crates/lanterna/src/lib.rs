#![forbid(unsafe_code)]

//! lanterna — an HLS client engine.
//!
//! Feed it a master manifest URL, a pair of sample sinks and an asset
//! opener; it selects a rendition, downloads and assembles segments, and
//! pumps both sinks from a shared presentation clock, downshifting
//! resolution when playback stalls.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use lanterna::{Player, PlayerOptions};
//! # use lanterna_render::mock::CollectingSink;
//! # async fn demo(opener: Arc<dyn lanterna::AssetOpener>) -> Result<(), lanterna::PlayerError> {
//! let clock = Arc::new(lanterna_render::PresentationClock::new());
//! let video = Arc::new(CollectingSink::with_clock(clock.clone()));
//! let audio = Arc::new(CollectingSink::with_clock(clock.clone()));
//! let options = PlayerOptions::new("https://cdn.example.com/master.m3u8".parse().unwrap());
//! let player = Player::new(options, opener, video, audio, clock);
//! player.play().await?;
//! # Ok(())
//! # }
//! ```

mod asset;
mod error;
mod events;
mod options;
mod player;
mod resolution;

pub use asset::AssetOpener;
pub use error::PlayerError;
pub use events::{PlayerEvent, PlayerStatus};
pub use options::PlayerOptions;
pub use player::Player;
pub use resolution::ResolutionLadder;
