#![forbid(unsafe_code)]

//! Network layer for lanterna: a small HTTP abstraction with a `reqwest`
//! backed client, the two byte-range fetchers used by the download session,
//! and the shared bandwidth meter.

mod client;
mod error;
mod fetch;
mod meter;
mod traits;
mod types;

pub use client::HttpClient;
pub use error::{FetchError, NetError, NetResult};
pub use fetch::{Consumer, ErrorFn, Fetcher, FileFetcher, PullFn, StreamingFetcher};
pub use meter::BandwidthMeter;
pub use traits::{ByteStream, Net};
pub use types::{Headers, NetOptions, RangeSpec};
