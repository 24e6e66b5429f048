use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::Client;
use url::Url;

use crate::{
    error::NetError,
    traits::{ByteStream, Net},
    types::{Headers, NetOptions, RangeSpec},
};

/// Default `Net` implementation over a pooled reqwest client.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    pub fn new(options: NetOptions) -> Self {
        let inner = Client::builder()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .expect("failed to build reqwest client");
        Self { inner, options }
    }

    fn apply_timeout(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.options.request_timeout {
            Some(t) => req.timeout(t),
            None => req,
        }
    }

    fn apply_headers(
        mut req: reqwest::RequestBuilder,
        headers: Option<Headers>,
    ) -> reqwest::RequestBuilder {
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }

    async fn checked_send(
        &self,
        req: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<reqwest::Response, NetError> {
        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status();

        // 206 is the expected success for ranged requests.
        if !(status.is_success() || status.as_u16() == 206) {
            let body = resp.text().await.unwrap_or_default();
            return Err(NetError::HttpStatus {
                status: status.as_u16(),
                url: url.clone(),
                body: Some(body),
            });
        }

        Ok(resp)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(NetOptions::default())
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError> {
        let req = self.inner.get(url.clone());
        let req = Self::apply_headers(req, headers);
        let req = self.apply_timeout(req);

        let resp = self.checked_send(req, &url).await?;
        resp.bytes().await.map_err(NetError::from)
    }

    async fn get_with_headers(&self, url: Url) -> Result<(Bytes, Headers), NetError> {
        let req = self.apply_timeout(self.inner.get(url.clone()));
        let resp = self.checked_send(req, &url).await?;

        let mut out = Headers::new();
        for (name, value) in resp.headers().iter() {
            if let Ok(v) = value.to_str() {
                out.insert(name.as_str(), v);
            }
        }

        let bytes = resp.bytes().await.map_err(NetError::from)?;
        Ok((bytes, out))
    }

    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError> {
        let req = self.inner.get(url.clone());
        let req = Self::apply_headers(req, headers);
        let req = self.apply_timeout(req);

        let resp = self.checked_send(req, &url).await?;
        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(Box::pin(stream))
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteStream, NetError> {
        let req = self
            .inner
            .get(url.clone())
            .header("Range", range.to_header_value());
        let req = Self::apply_headers(req, headers);
        let req = self.apply_timeout(req);

        let resp = self.checked_send(req, &url).await?;
        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, routing::get};
    use tokio::net::TcpListener;

    use super::*;

    async fn run_test_server() -> String {
        let app = Router::new().route("/blob", get(|| async { "0123456789" }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{}", addr.port())
    }

    #[tokio::test]
    async fn get_bytes_returns_body() {
        let base = run_test_server().await;
        let url: Url = format!("{base}/blob").parse().unwrap();

        let net = HttpClient::default();
        let bytes = net.get_bytes(url, None).await.unwrap();
        assert_eq!(&bytes[..], b"0123456789");
    }

    #[tokio::test]
    async fn missing_resource_is_status_error() {
        let base = run_test_server().await;
        let url: Url = format!("{base}/missing").parse().unwrap();

        let net = HttpClient::default();
        let err = net.get_bytes(url, None).await.unwrap_err();
        match err {
            NetError::HttpStatus { status, .. } => assert_eq!(status, 404),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }
}
