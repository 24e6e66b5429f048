#![forbid(unsafe_code)]

//! HLS manifest handling and segment downloading.
//!
//! This crate owns the three manifest-facing pieces of the engine: the
//! RFC 8216 subset parser ([`parser`]), the playlist loader with its
//! master-to-media retry ([`loader`]), and the download session that turns a
//! media playlist into ordered, blob-store-backed segment files
//! ([`session`]).

mod error;
mod keys;
mod loader;
pub mod parser;
mod playlist;
mod session;

pub use error::{LoaderError, ManifestError};
pub use keys::SessionKey;
pub use loader::PlaylistLoader;
pub use playlist::{
    ByteRange, IFrameStreamInf, InitSection, MasterPlaylist, MediaPlaylist, MediaTag, MediaType,
    Playlist, PlaylistType, RawParams, Resolution, Segment, StartPoint, StreamInf,
};
pub use session::{DownloadSession, SegmentReady, SessionOptions};
