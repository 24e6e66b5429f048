use thiserror::Error;

/// Errors produced while parsing a playlist body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("playlist is not valid UTF-8")]
    InvalidEncoding,

    #[error("invalid playlist: {0}")]
    InvalidFormat(String),

    /// A media-only tag was seen during a master parse. The loader uses this
    /// as the signal to retry the same body as a media playlist.
    #[error("media playlist tags found in master context")]
    MediaInsteadOfMaster,
}

/// Errors produced by the playlist loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

impl From<lanterna_net::NetError> for LoaderError {
    fn from(e: lanterna_net::NetError) -> Self {
        Self::Network(e.to_string())
    }
}
