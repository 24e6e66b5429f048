use url::Url;

/// Identity of a fetcher within one download session.
///
/// Streaming fetchers are keyed by URL alone (`offset: None`) so a segment
/// and its co-located initialization section share one connection; file
/// fetchers are keyed per range offset.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub url: Url,
    pub offset: Option<u64>,
}

impl SessionKey {
    pub fn streaming(url: Url) -> Self {
        Self { url, offset: None }
    }

    pub fn file(url: Url, offset: u64) -> Self {
        Self {
            url,
            offset: Some(offset),
        }
    }
}
