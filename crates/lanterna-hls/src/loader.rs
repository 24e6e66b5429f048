use std::sync::Arc;

use lanterna_net::Net;
use tracing::debug;
use url::Url;

use crate::error::{LoaderError, ManifestError};
use crate::parser;
use crate::playlist::{MediaPlaylist, Playlist};

/// Fetches and parses playlists, resolving media URIs against the master's
/// location.
pub struct PlaylistLoader {
    net: Arc<dyn Net>,
    base_url: Url,
    supports_ranges: bool,
}

impl PlaylistLoader {
    pub fn new(net: Arc<dyn Net>, base_url: Url) -> Self {
        Self {
            net,
            base_url,
            supports_ranges: false,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether the server advertised `Accept-Ranges: bytes` on the last
    /// load. Meaningful only after [`load`](Self::load) has run.
    pub fn supports_ranges(&self) -> bool {
        self.supports_ranges
    }

    /// Fetch the base URL and parse it, attempting a master parse first and
    /// retrying the same body as a media playlist when the parser reports
    /// `MediaInsteadOfMaster`.
    pub async fn load(&mut self) -> Result<Playlist, LoaderError> {
        let (body, headers) = self.net.get_with_headers(self.base_url.clone()).await?;

        self.supports_ranges = headers
            .get_ignore_case("Accept-Ranges")
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));

        match parser::parse_master(&body) {
            Ok(master) => Ok(Playlist::Master(master)),
            Err(ManifestError::MediaInsteadOfMaster) => {
                debug!(url = %self.base_url, "loader: master parse hit media tags, retrying as media");
                let media = parser::parse_media(&body)?;
                Ok(Playlist::Media(media))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch and parse a media playlist at `uri`, resolved against the base
    /// URL. A `MediaInsteadOfMaster` here is a hard error.
    pub async fn load_media(&self, uri: &str) -> Result<(MediaPlaylist, Url), LoaderError> {
        let url = self.resolve(uri)?;
        let body = self.net.get_bytes(url.clone(), None).await?;
        let media = parser::parse_media(&body)?;
        Ok((media, url))
    }

    /// Resolve `uri`: absolute when it carries a scheme separator, otherwise
    /// joined against the base URL with its last path component stripped.
    pub fn resolve(&self, uri: &str) -> Result<Url, LoaderError> {
        if uri.contains("://") {
            return Url::parse(uri).map_err(|e| LoaderError::InvalidUrl(format!("{uri}: {e}")));
        }
        self.base_url
            .join(uri)
            .map_err(|e| LoaderError::InvalidUrl(format!("{uri}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::header, response::IntoResponse, routing::get};
    use lanterna_net::HttpClient;
    use tokio::net::TcpListener;

    use super::*;

    const MASTER: &str = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1280x720\nv/720.m3u8\n";
    const MEDIA: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\nseg_0.ts\n#EXT-X-ENDLIST\n";

    async fn master_with_ranges() -> impl IntoResponse {
        ([(header::ACCEPT_RANGES, "bytes")], MASTER)
    }

    async fn run_test_server() -> String {
        let app = Router::new()
            .route("/master.m3u8", get(master_with_ranges))
            .route("/media.m3u8", get(|| async { MEDIA }))
            .route("/v/720.m3u8", get(|| async { MEDIA }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{}", addr.port())
    }

    fn loader(base: &str, path: &str) -> PlaylistLoader {
        let url: Url = format!("{base}{path}").parse().unwrap();
        PlaylistLoader::new(Arc::new(HttpClient::default()), url)
    }

    #[tokio::test]
    async fn load_master_and_record_range_support() {
        let base = run_test_server().await;
        let mut loader = loader(&base, "/master.m3u8");

        let playlist = loader.load().await.unwrap();
        match playlist {
            Playlist::Master(master) => assert_eq!(master.streams.len(), 1),
            Playlist::Media(_) => panic!("expected master"),
        }
        assert!(loader.supports_ranges());
    }

    #[tokio::test]
    async fn media_body_retries_as_media() {
        let base = run_test_server().await;
        let mut loader = loader(&base, "/media.m3u8");

        let playlist = loader.load().await.unwrap();
        match playlist {
            Playlist::Media(media) => assert_eq!(media.segments.len(), 1),
            Playlist::Master(_) => panic!("expected media"),
        }
        // This endpoint does not advertise ranges.
        assert!(!loader.supports_ranges());
    }

    #[tokio::test]
    async fn load_media_resolves_relative_uri() {
        let base = run_test_server().await;
        let loader = loader(&base, "/master.m3u8");

        let (media, url) = loader.load_media("v/720.m3u8").await.unwrap();
        assert_eq!(media.segments.len(), 1);
        assert_eq!(url.path(), "/v/720.m3u8");
    }

    #[tokio::test]
    async fn network_errors_surface_verbatim() {
        let base = run_test_server().await;
        let loader = loader(&base, "/master.m3u8");

        let err = loader.load_media("missing.m3u8").await.unwrap_err();
        assert!(matches!(err, LoaderError::Network(_)));
    }

    #[test]
    fn resolve_absolute_and_relative() {
        let loader = PlaylistLoader::new(
            Arc::new(HttpClient::default()),
            "https://cdn.example.com/hls/master.m3u8".parse().unwrap(),
        );

        let abs = loader.resolve("https://other.example.com/a.m3u8").unwrap();
        assert_eq!(abs.as_str(), "https://other.example.com/a.m3u8");

        let rel = loader.resolve("audio/eng.m3u8").unwrap();
        assert_eq!(rel.as_str(), "https://cdn.example.com/hls/audio/eng.m3u8");
    }
}
