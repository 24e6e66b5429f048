use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Only master-based HLS supported")]
    UnsupportedPlaylistShape,

    #[error("media load failed: {0}")]
    MediaLoadFailed(String),
}

impl From<lanterna_hls::LoaderError> for PlayerError {
    fn from(e: lanterna_hls::LoaderError) -> Self {
        Self::MediaLoadFailed(e.to_string())
    }
}
