//! Hand-written parser for the RFC 8216 subset in [`crate::playlist`].
//!
//! The line model is deliberately simple: split on `\n`, the first non-empty
//! line must be `#EXTM3U`, lines starting with `#` are tags, and every other
//! line is a URI consumed by whichever tag context last latched metadata.

use std::sync::Arc;

use crate::error::ManifestError;
use crate::playlist::{
    ByteRange, IFrameStreamInf, InitSection, MasterPlaylist, MediaPlaylist, MediaTag, MediaType,
    Playlist, PlaylistType, Resolution, Segment, StartPoint, StreamInf,
};

/// Tags that may only appear in a media playlist. Seeing one of these during
/// a master parse aborts with [`ManifestError::MediaInsteadOfMaster`], the
/// loader's retry signal.
const MEDIA_ONLY_TAGS: &[&str] = &[
    "EXTINF",
    "EXT-X-BYTERANGE",
    "EXT-X-MAP",
    "EXT-X-TARGETDURATION",
    "EXT-X-MEDIA-SEQUENCE",
    "EXT-X-DISCONTINUITY-SEQUENCE",
    "EXT-X-ENDLIST",
    "EXT-X-PLAYLIST-TYPE",
    "EXT-X-I-FRAMES-ONLY",
];

/// Parse an attribute list left to right into ordered `(key, value)` pairs.
///
/// Three rules: `"` toggles quoted mode, `=` outside quotes switches from key
/// to value accumulation, `,` outside quotes commits the current pair. A
/// synthetic trailing comma flushes the last pair.
pub fn split_params(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;

    let mut commit = |key: &mut String, value: &mut String, in_value: &mut bool| {
        if !key.is_empty() || !value.is_empty() {
            pairs.push((std::mem::take(key), std::mem::take(value)));
        }
        *in_value = false;
    };

    for c in input.chars().chain(std::iter::once(',')) {
        match c {
            '"' => in_quotes = !in_quotes,
            '=' if !in_quotes && !in_value => in_value = true,
            ',' if !in_quotes => commit(&mut key, &mut value, &mut in_value),
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }

    pairs
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Split a tag line into `(NAME, params)`, with the leading `#` removed.
fn split_tag(line: &str) -> (&str, &str) {
    let body = &line[1..];
    match body.split_once(':') {
        Some((name, params)) => (name, params),
        None => (body, ""),
    }
}

/// Parse `length[@offset]`.
fn parse_byte_range(input: &str) -> Result<ByteRange, ManifestError> {
    let (length, offset) = match input.split_once('@') {
        Some((l, o)) => (l, Some(o)),
        None => (input, None),
    };
    let length = length
        .trim()
        .parse()
        .map_err(|_| ManifestError::InvalidFormat(format!("bad byte range: {input}")))?;
    let offset = match offset {
        Some(o) => Some(
            o.trim()
                .parse()
                .map_err(|_| ManifestError::InvalidFormat(format!("bad byte range: {input}")))?,
        ),
        None => None,
    };
    Ok(ByteRange { length, offset })
}

fn is_yes(v: Option<&str>) -> bool {
    v == Some("YES")
}

/// Lines of a playlist body: `\n`-separated, `\r` and surrounding whitespace
/// stripped, empties dropped.
fn lines(data: &[u8]) -> Result<Vec<&str>, ManifestError> {
    let text = std::str::from_utf8(data).map_err(|_| ManifestError::InvalidEncoding)?;
    let lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.trim_matches(['\r', ' ', '\t']))
        .filter(|l| !l.is_empty())
        .collect();

    match lines.first() {
        Some(&"#EXTM3U") => Ok(lines),
        _ => Err(ManifestError::InvalidFormat(
            "playlist must start with #EXTM3U".to_string(),
        )),
    }
}

/// Parse a master playlist.
pub fn parse_master(data: &[u8]) -> Result<MasterPlaylist, ManifestError> {
    let mut out = MasterPlaylist::default();
    let mut pending_stream: Option<StreamInf> = None;

    for line in lines(data)?.into_iter().skip(1) {
        if !line.starts_with('#') {
            // URI line: belongs to the last #EXT-X-STREAM-INF.
            if let Some(mut stream) = pending_stream.take() {
                stream.uri = Some(line.to_string());
                out.streams.push(stream);
            }
            continue;
        }

        let (name, rest) = split_tag(line);
        if MEDIA_ONLY_TAGS.contains(&name) {
            return Err(ManifestError::MediaInsteadOfMaster);
        }

        match name {
            "EXT-X-MEDIA" => {
                let params = split_params(rest);
                let Some(media_type) = param(&params, "TYPE").and_then(MediaType::parse) else {
                    continue;
                };
                out.media.push(MediaTag {
                    media_type,
                    group_id: param(&params, "GROUP-ID").map(String::from),
                    language: param(&params, "LANGUAGE").map(String::from),
                    name: param(&params, "NAME").map(String::from),
                    default: is_yes(param(&params, "DEFAULT")),
                    autoselect: is_yes(param(&params, "AUTOSELECT")),
                    forced: is_yes(param(&params, "FORCED")),
                    uri: param(&params, "URI").map(String::from),
                });
            }
            "EXT-X-STREAM-INF" => {
                let params = split_params(rest);
                pending_stream = Some(StreamInf {
                    bandwidth: param(&params, "BANDWIDTH").and_then(|v| v.parse().ok()),
                    average_bandwidth: param(&params, "AVERAGE-BANDWIDTH")
                        .and_then(|v| v.parse().ok()),
                    codecs: param(&params, "CODECS").map(String::from),
                    resolution: param(&params, "RESOLUTION").and_then(Resolution::parse),
                    frame_rate: param(&params, "FRAME-RATE").and_then(|v| v.parse().ok()),
                    hdcp_level: param(&params, "HDCP-LEVEL").map(String::from),
                    audio: param(&params, "AUDIO").map(String::from),
                    video: param(&params, "VIDEO").map(String::from),
                    subtitles: param(&params, "SUBTITLES").map(String::from),
                    closed_captions: param(&params, "CLOSED-CAPTIONS").map(String::from),
                    uri: None,
                });
            }
            "EXT-X-I-FRAME-STREAM-INF" => {
                let params = split_params(rest);
                out.iframe_streams.push(IFrameStreamInf {
                    bandwidth: param(&params, "BANDWIDTH").and_then(|v| v.parse().ok()),
                    average_bandwidth: param(&params, "AVERAGE-BANDWIDTH")
                        .and_then(|v| v.parse().ok()),
                    codecs: param(&params, "CODECS").map(String::from),
                    resolution: param(&params, "RESOLUTION").and_then(Resolution::parse),
                    hdcp_level: param(&params, "HDCP-LEVEL").map(String::from),
                    video: param(&params, "VIDEO").map(String::from),
                    uri: param(&params, "URI").map(String::from),
                });
            }
            "EXT-X-SESSION-DATA" => out.session_data.push(split_params(rest)),
            "EXT-X-SESSION-KEY" => out.session_keys.push(split_params(rest)),
            "EXT-X-INDEPENDENT-SEGMENTS" => out.has_independent_segments = true,
            "EXT-X-START" => {
                let params = split_params(rest);
                if let Some(offset) = param(&params, "TIME-OFFSET").and_then(|v| v.parse().ok()) {
                    out.start = Some(StartPoint {
                        time_offset: offset,
                        precise: is_yes(param(&params, "PRECISE")),
                    });
                }
            }
            // Unknown tags and comments are ignored for forward compatibility.
            _ => {}
        }
    }

    Ok(out)
}

/// Parse a media playlist.
pub fn parse_media(data: &[u8]) -> Result<MediaPlaylist, ManifestError> {
    let mut out = MediaPlaylist::default();

    // Tag state latched for the next URI line. Duration and byte range are
    // one-shot; the init section is sticky until replaced.
    let mut pending_duration: Option<f64> = None;
    let mut pending_byte_range: Option<ByteRange> = None;
    let mut current_init: Option<Arc<InitSection>> = None;

    for line in lines(data)?.into_iter().skip(1) {
        if !line.starts_with('#') {
            out.segments.push(Segment {
                duration: pending_duration.take(),
                byte_range: pending_byte_range.take(),
                uri: line.to_string(),
                init_section: current_init.clone(),
            });
            continue;
        }

        let (name, rest) = split_tag(line);
        match name {
            "EXTINF" => {
                let duration = rest.split_once(',').map_or(rest, |(d, _)| d);
                pending_duration = Some(duration.trim().parse().map_err(|_| {
                    ManifestError::InvalidFormat(format!("bad EXTINF duration: {rest}"))
                })?);
            }
            "EXT-X-BYTERANGE" => pending_byte_range = Some(parse_byte_range(rest)?),
            "EXT-X-MAP" => {
                let params = split_params(rest);
                let uri = param(&params, "URI").ok_or_else(|| {
                    ManifestError::InvalidFormat("EXT-X-MAP without URI".to_string())
                })?;
                let byte_range = match param(&params, "BYTERANGE") {
                    Some(r) => Some(parse_byte_range(r)?),
                    None => None,
                };
                current_init = Some(Arc::new(InitSection {
                    uri: uri.to_string(),
                    byte_range,
                }));
            }
            "EXT-X-TARGETDURATION" => {
                out.target_duration = Some(rest.trim().parse().map_err(|_| {
                    ManifestError::InvalidFormat(format!("bad target duration: {rest}"))
                })?);
            }
            "EXT-X-MEDIA-SEQUENCE" => out.media_sequence = rest.trim().parse().ok(),
            "EXT-X-DISCONTINUITY-SEQUENCE" => {
                out.discontinuity_sequence = rest.trim().parse().ok();
            }
            "EXT-X-ENDLIST" => out.endlist = true,
            "EXT-X-PLAYLIST-TYPE" => {
                out.playlist_type = match rest.trim() {
                    "EVENT" => Some(PlaylistType::Event),
                    "VOD" => Some(PlaylistType::Vod),
                    _ => None,
                };
            }
            "EXT-X-I-FRAMES-ONLY" => out.has_iframes_only = true,
            _ => {}
        }
    }

    Ok(out)
}

/// Parse as master, retrying as media when master parsing reports
/// [`ManifestError::MediaInsteadOfMaster`].
pub fn parse(data: &[u8]) -> Result<Playlist, ManifestError> {
    match parse_master(data) {
        Ok(master) => Ok(Playlist::Master(master)),
        Err(ManifestError::MediaInsteadOfMaster) => parse_media(data).map(Playlist::Media),
        Err(e) => Err(e),
    }
}
