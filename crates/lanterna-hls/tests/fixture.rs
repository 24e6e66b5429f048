//! Loopback CDN for download-session tests: serves registered files with
//! byte-range support and counts per-path requests.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use url::Url;

#[derive(Clone)]
pub struct TestCdn {
    pub base_url: String,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

async fn serve_file(
    State(cdn): State<TestCdn>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    *cdn.hits.lock().entry(path.clone()).or_insert(0) += 1;

    let Some(body) = cdn.files.lock().get(&path).cloned() else {
        return (StatusCode::NOT_FOUND, Vec::new()).into_response();
    };

    let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) else {
        return (
            StatusCode::OK,
            [(header::ACCEPT_RANGES, "bytes")],
            body,
        )
            .into_response();
    };

    let spec = range.trim_start_matches("bytes=");
    let (start, end) = spec.split_once('-').unwrap_or((spec, ""));
    let start: usize = start.parse().unwrap_or(0);
    let end: usize = if end.is_empty() {
        body.len() - 1
    } else {
        end.parse::<usize>().unwrap_or(body.len() - 1)
    };
    let slice = body[start..=end.min(body.len() - 1)].to_vec();
    (
        StatusCode::PARTIAL_CONTENT,
        [(header::ACCEPT_RANGES, "bytes")],
        slice,
    )
        .into_response()
}

impl TestCdn {
    pub async fn start(files: Vec<(&str, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let cdn = Self {
            base_url: format!("http://127.0.0.1:{}", addr.port()),
            files: Arc::new(Mutex::new(
                files
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            )),
            hits: Arc::new(Mutex::new(HashMap::new())),
        };

        let app = Router::new()
            .route("/{*path}", get(serve_file))
            .with_state(cdn.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        cdn
    }

    pub fn url(&self, path: &str) -> Url {
        format!("{}/{}", self.base_url, path).parse().unwrap()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().get(path).copied().unwrap_or(0)
    }
}
