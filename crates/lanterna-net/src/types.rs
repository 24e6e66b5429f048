use std::collections::HashMap;
use std::time::Duration;

/// Response/request headers as a flat string map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(|s| s.as_str())
    }

    /// Case-insensitive lookup, for headers whose casing servers disagree on
    /// (`Accept-Ranges`, `Content-Length`).
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<HashMap<String, String>> for Headers {
    fn from(map: HashMap<String, String>) -> Self {
        Self { inner: map }
    }
}

/// An HTTP byte range. `end` is inclusive, per the `Range` header grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Open-ended range from `start`.
    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Closed range covering `length` bytes at `offset`.
    pub fn with_length(offset: u64, length: u64) -> Self {
        Self {
            start: offset,
            end: Some(offset + length.saturating_sub(1)),
        }
    }

    pub fn to_header_value(&self) -> String {
        if let Some(end) = self.end {
            format!("bytes={}-{}", self.start, end)
        } else {
            format!("bytes={}-", self.start)
        }
    }
}

#[derive(Clone, Debug)]
pub struct NetOptions {
    /// Per-request timeout. `None` leaves requests unbounded, which is the
    /// correct default for long-lived streaming GETs.
    pub request_timeout: Option<Duration>,
    pub pool_max_idle_per_host: usize,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            request_timeout: None,
            pool_max_idle_per_host: 4,
        }
    }
}
