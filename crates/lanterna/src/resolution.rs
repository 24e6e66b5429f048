use lanterna_hls::{MasterPlaylist, StreamInf};
use tracing::debug;

/// Renditions grouped by their raw `WxH` resolution string, ordered by
/// descending height.
///
/// The raw string is the grouping key (width information must not be lost);
/// heights are read from the pair derived at parse time.
pub struct ResolutionLadder {
    /// `(raw resolution, height, indexes into the master's stream list)`.
    rungs: Vec<(String, u32, Vec<usize>)>,
    preferred_height: u32,
}

impl ResolutionLadder {
    pub fn from_master(master: &MasterPlaylist, preferred_height: u32) -> Self {
        let mut rungs: Vec<(String, u32, Vec<usize>)> = Vec::new();

        for (index, stream) in master.streams.iter().enumerate() {
            let Some(resolution) = &stream.resolution else {
                continue;
            };
            match rungs.iter_mut().find(|(raw, _, _)| raw == resolution.raw()) {
                Some((_, _, members)) => members.push(index),
                None => rungs.push((
                    resolution.raw().to_string(),
                    resolution.height(),
                    vec![index],
                )),
            }
        }

        rungs.sort_by(|a, b| b.1.cmp(&a.1));
        debug!(rungs = rungs.len(), "resolution ladder built");

        Self {
            rungs,
            preferred_height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    /// Raw resolution strings, highest first.
    pub fn available(&self) -> Vec<String> {
        self.rungs.iter().map(|(raw, _, _)| raw.clone()).collect()
    }

    /// Default rendition: the preferred height when present, else the first
    /// stream's resolution.
    pub fn default_resolution(&self) -> Option<&str> {
        self.rungs
            .iter()
            .find(|(_, height, _)| *height == self.preferred_height)
            .or_else(|| self.rungs.first())
            .map(|(raw, _, _)| raw.as_str())
    }

    /// The next rung below `current`, `None` at the bottom (or for an
    /// unknown resolution).
    pub fn next_lower(&self, current: &str) -> Option<&str> {
        let position = self.rungs.iter().position(|(raw, _, _)| raw == current)?;
        self.rungs
            .get(position + 1)
            .map(|(raw, _, _)| raw.as_str())
    }

    /// First stream of the given rung.
    pub fn stream_index(&self, raw: &str) -> Option<usize> {
        self.rungs
            .iter()
            .find(|(r, _, _)| r == raw)
            .and_then(|(_, _, members)| members.first().copied())
    }

    pub fn stream_for<'a>(&self, master: &'a MasterPlaylist, raw: &str) -> Option<&'a StreamInf> {
        master.streams.get(self.stream_index(raw)?)
    }
}
