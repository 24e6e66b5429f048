//! Typed playlist model for the RFC 8216 subset this engine consumes.
//!
//! Playlists are immutable after parsing. The [`std::fmt::Display`] impls
//! render a playlist back to valid M3U8 text; stream counts, resolution
//! strings and URIs round-trip through parse-then-render.

use std::fmt;
use std::sync::Arc;

/// A parsed playlist: either a master manifest describing renditions or a
/// media manifest describing segments.
#[derive(Debug, Clone)]
pub enum Playlist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

/// A `RESOLUTION=WxH` attribute. The raw string is authoritative (it is the
/// rendition-grouping key); the numeric pair is derived at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resolution {
    raw: String,
    width: u32,
    height: u32,
}

impl Resolution {
    /// Parse `WxH`. Returns `None` when either side is not an integer.
    pub fn parse(raw: &str) -> Option<Self> {
        let (w, h) = raw.split_once(['x', 'X'])?;
        Some(Self {
            raw: raw.to_string(),
            width: w.trim().parse().ok()?,
            height: h.trim().parse().ok()?,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One `#EXT-X-STREAM-INF` entry (URI taken from the following line).
#[derive(Debug, Clone, Default)]
pub struct StreamInf {
    pub bandwidth: Option<u64>,
    pub average_bandwidth: Option<u64>,
    pub codecs: Option<String>,
    pub resolution: Option<Resolution>,
    pub frame_rate: Option<f64>,
    pub hdcp_level: Option<String>,
    pub audio: Option<String>,
    pub video: Option<String>,
    pub subtitles: Option<String>,
    pub closed_captions: Option<String>,
    pub uri: Option<String>,
}

/// One `#EXT-X-I-FRAME-STREAM-INF` entry (URI from its `URI` attribute).
#[derive(Debug, Clone, Default)]
pub struct IFrameStreamInf {
    pub bandwidth: Option<u64>,
    pub average_bandwidth: Option<u64>,
    pub codecs: Option<String>,
    pub resolution: Option<Resolution>,
    pub hdcp_level: Option<String>,
    pub video: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Video,
    Subtitles,
    ClosedCaptions,
}

impl MediaType {
    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "AUDIO" => Some(Self::Audio),
            "VIDEO" => Some(Self::Video),
            "SUBTITLES" => Some(Self::Subtitles),
            "CLOSED-CAPTIONS" => Some(Self::ClosedCaptions),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "AUDIO",
            Self::Video => "VIDEO",
            Self::Subtitles => "SUBTITLES",
            Self::ClosedCaptions => "CLOSED-CAPTIONS",
        }
    }
}

/// One `#EXT-X-MEDIA` rendition entry.
#[derive(Debug, Clone)]
pub struct MediaTag {
    pub media_type: MediaType,
    pub group_id: Option<String>,
    pub language: Option<String>,
    pub name: Option<String>,
    pub default: bool,
    pub autoselect: bool,
    pub forced: bool,
    pub uri: Option<String>,
}

/// `#EXT-X-START:TIME-OFFSET=...,PRECISE=...`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartPoint {
    pub time_offset: f64,
    pub precise: bool,
}

/// Raw attribute list of a tag we pass through without interpreting
/// (`#EXT-X-SESSION-DATA`, `#EXT-X-SESSION-KEY`).
pub type RawParams = Vec<(String, String)>;

#[derive(Debug, Clone, Default)]
pub struct MasterPlaylist {
    pub streams: Vec<StreamInf>,
    pub iframe_streams: Vec<IFrameStreamInf>,
    pub media: Vec<MediaTag>,
    pub session_data: Vec<RawParams>,
    pub session_keys: Vec<RawParams>,
    pub has_independent_segments: bool,
    pub start: Option<StartPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Event,
    Vod,
}

/// `length[@offset]` as carried by `#EXT-X-BYTERANGE` and `BYTERANGE=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub length: u64,
    pub offset: Option<u64>,
}

/// Initialization section declared by `#EXT-X-MAP`. Shared by every segment
/// that references it; segments hold an `Arc`, never an owned copy.
#[derive(Debug, Clone, PartialEq)]
pub struct InitSection {
    pub uri: String,
    pub byte_range: Option<ByteRange>,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub duration: Option<f64>,
    pub byte_range: Option<ByteRange>,
    pub uri: String,
    pub init_section: Option<Arc<InitSection>>,
}

#[derive(Debug, Clone, Default)]
pub struct MediaPlaylist {
    pub target_duration: Option<f64>,
    pub media_sequence: Option<u64>,
    pub discontinuity_sequence: Option<u64>,
    pub endlist: bool,
    pub playlist_type: Option<PlaylistType>,
    pub has_iframes_only: bool,
    pub segments: Vec<Segment>,
}

impl MediaPlaylist {
    /// Effective duration of segment `i`, falling back to the target
    /// duration for segments missing `#EXTINF`.
    pub fn segment_duration(&self, index: usize) -> f64 {
        self.segments[index]
            .duration
            .or(self.target_duration)
            .unwrap_or(0.0)
    }

    /// Total declared duration.
    pub fn total_duration(&self) -> f64 {
        (0..self.segments.len())
            .map(|i| self.segment_duration(i))
            .sum()
    }
}

fn fmt_byte_range(range: &ByteRange) -> String {
    match range.offset {
        Some(offset) => format!("{}@{}", range.length, offset),
        None => format!("{}", range.length),
    }
}

impl fmt::Display for MasterPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        if self.has_independent_segments {
            writeln!(f, "#EXT-X-INDEPENDENT-SEGMENTS")?;
        }
        if let Some(start) = &self.start {
            writeln!(
                f,
                "#EXT-X-START:TIME-OFFSET={},PRECISE={}",
                start.time_offset,
                if start.precise { "YES" } else { "NO" }
            )?;
        }
        for tag in &self.media {
            write!(f, "#EXT-X-MEDIA:TYPE={}", tag.media_type.as_str())?;
            if let Some(g) = &tag.group_id {
                write!(f, ",GROUP-ID=\"{g}\"")?;
            }
            if let Some(l) = &tag.language {
                write!(f, ",LANGUAGE=\"{l}\"")?;
            }
            if let Some(n) = &tag.name {
                write!(f, ",NAME=\"{n}\"")?;
            }
            if tag.default {
                write!(f, ",DEFAULT=YES")?;
            }
            if tag.autoselect {
                write!(f, ",AUTOSELECT=YES")?;
            }
            if tag.forced {
                write!(f, ",FORCED=YES")?;
            }
            if let Some(u) = &tag.uri {
                write!(f, ",URI=\"{u}\"")?;
            }
            writeln!(f)?;
        }
        for stream in &self.streams {
            write!(f, "#EXT-X-STREAM-INF:")?;
            let mut first = true;
            let mut sep = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
                if first {
                    first = false;
                    Ok(())
                } else {
                    write!(f, ",")
                }
            };
            if let Some(b) = stream.bandwidth {
                sep(f)?;
                write!(f, "BANDWIDTH={b}")?;
            }
            if let Some(b) = stream.average_bandwidth {
                sep(f)?;
                write!(f, "AVERAGE-BANDWIDTH={b}")?;
            }
            if let Some(c) = &stream.codecs {
                sep(f)?;
                write!(f, "CODECS=\"{c}\"")?;
            }
            if let Some(r) = &stream.resolution {
                sep(f)?;
                write!(f, "RESOLUTION={r}")?;
            }
            if let Some(fr) = stream.frame_rate {
                sep(f)?;
                write!(f, "FRAME-RATE={fr}")?;
            }
            if let Some(a) = &stream.audio {
                sep(f)?;
                write!(f, "AUDIO=\"{a}\"")?;
            }
            writeln!(f)?;
            if let Some(uri) = &stream.uri {
                writeln!(f, "{uri}")?;
            }
        }
        for stream in &self.iframe_streams {
            write!(f, "#EXT-X-I-FRAME-STREAM-INF:")?;
            if let Some(b) = stream.bandwidth {
                write!(f, "BANDWIDTH={b},")?;
            }
            if let Some(r) = &stream.resolution {
                write!(f, "RESOLUTION={r},")?;
            }
            writeln!(f, "URI=\"{}\"", stream.uri.as_deref().unwrap_or(""))?;
        }
        Ok(())
    }
}

impl fmt::Display for MediaPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        if let Some(td) = self.target_duration {
            writeln!(f, "#EXT-X-TARGETDURATION:{td}")?;
        }
        if let Some(ms) = self.media_sequence {
            writeln!(f, "#EXT-X-MEDIA-SEQUENCE:{ms}")?;
        }
        if let Some(ds) = self.discontinuity_sequence {
            writeln!(f, "#EXT-X-DISCONTINUITY-SEQUENCE:{ds}")?;
        }
        if let Some(pt) = self.playlist_type {
            writeln!(
                f,
                "#EXT-X-PLAYLIST-TYPE:{}",
                match pt {
                    PlaylistType::Event => "EVENT",
                    PlaylistType::Vod => "VOD",
                }
            )?;
        }
        if self.has_iframes_only {
            writeln!(f, "#EXT-X-I-FRAMES-ONLY")?;
        }

        let mut last_init: Option<&Arc<InitSection>> = None;
        for segment in &self.segments {
            if let Some(init) = &segment.init_section {
                if last_init.is_none_or(|prev| !Arc::ptr_eq(prev, init)) {
                    write!(f, "#EXT-X-MAP:URI=\"{}\"", init.uri)?;
                    if let Some(range) = &init.byte_range {
                        write!(f, ",BYTERANGE=\"{}\"", fmt_byte_range(range))?;
                    }
                    writeln!(f)?;
                }
                last_init = Some(init);
            }
            if let Some(d) = segment.duration {
                writeln!(f, "#EXTINF:{d},")?;
            }
            if let Some(range) = &segment.byte_range {
                writeln!(f, "#EXT-X-BYTERANGE:{}", fmt_byte_range(range))?;
            }
            writeln!(f, "{}", segment.uri)?;
        }

        if self.endlist {
            writeln!(f, "#EXT-X-ENDLIST")?;
        }
        Ok(())
    }
}
