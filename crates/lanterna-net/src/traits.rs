use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use url::Url;

use crate::error::NetError;
use crate::types::{Headers, RangeSpec};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

#[async_trait]
pub trait Net: Send + Sync {
    /// Get all bytes from a URL.
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError>;

    /// Get all bytes plus the response headers.
    async fn get_with_headers(&self, url: Url) -> Result<(Bytes, Headers), NetError>;

    /// Stream bytes from a URL.
    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError>;

    /// Stream a byte range from a URL.
    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteStream, NetError>;
}
