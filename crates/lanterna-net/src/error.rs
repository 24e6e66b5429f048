use reqwest::Error as ReqwestError;
use thiserror::Error;
use url::Url;

pub type NetResult<T> = Result<T, NetError>;

/// Transport-level errors.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} for {url}")]
    HttpStatus {
        status: u16,
        url: Url,
        body: Option<String>,
    },

    #[error("Cancelled")]
    Cancelled,
}

impl From<ReqwestError> for NetError {
    fn from(e: ReqwestError) -> Self {
        // Alternate formatting keeps the full error chain
        // ("error sending request ...: connection refused").
        Self::Http(format!("{e:#}"))
    }
}

/// Errors surfaced by the byte-range fetchers through their `on_error` hook.
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<NetError> for FetchError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::Cancelled => Self::Cancelled,
            other => Self::Network(other.to_string()),
        }
    }
}
