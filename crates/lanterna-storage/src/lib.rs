#![forbid(unsafe_code)]

//! Content-addressed blob storage for assembled media segments.
//!
//! Entries are keyed by [`BytesKey`] — the basename of the source URI plus
//! the byte sub-range it was cut from — and point at files written under a
//! session-scoped directory in the system temp dir. Entries live until
//! [`BlobStore::purge`]; the files themselves survive process exit (cleanup
//! is a separate responsibility).

mod blob;
mod key;

pub use blob::{BlobStore, StorageError, StorageResult};
pub use key::{BytesKey, uri_basename, url_hash};
