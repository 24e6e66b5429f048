use sha2::{Digest, Sha256};
use url::Url;

/// Identity of one cached blob: the basename of the resource it came from
/// and the byte sub-range that was cut from it.
///
/// `length: None` means the whole resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BytesKey {
    pub basename: String,
    pub offset: u64,
    pub length: Option<u64>,
}

impl BytesKey {
    pub fn new(uri: &str, offset: u64, length: Option<u64>) -> Self {
        Self {
            basename: uri_basename(uri).to_string(),
            offset,
            length,
        }
    }

    /// Key for an unranged fetch of `uri`.
    pub fn whole(uri: &str) -> Self {
        Self::new(uri, 0, None)
    }
}

/// Extract the basename of a URI-like string, ignoring any query string.
pub fn uri_basename(uri: &str) -> &str {
    let no_query = uri.split('?').next().unwrap_or(uri);
    no_query.rsplit('/').next().unwrap_or(no_query)
}

/// Stable hash of an absolute URL: SHA-256 truncated to 16 bytes, hex.
///
/// Deterministic across runs and hosts, unlike a platform hash. The result
/// is an opaque filename component only.
pub fn url_hash(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}
