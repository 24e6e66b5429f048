use std::path::Path;
use std::sync::Arc;

use lanterna_render::{MediaAsset, ProducerError};

/// Turns an assembled segment file into a readable media asset.
///
/// Demuxing/decoding is outside this engine; the application supplies an
/// opener backed by whatever media framework it renders with.
pub trait AssetOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn MediaAsset>, ProducerError>;
}
