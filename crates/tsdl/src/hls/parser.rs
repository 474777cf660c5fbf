use std::str::FromStr;

use thiserror::Error;

use super::{
    attributes::Attributes,
    playlist::{Key, KeyMethod, Playlist, PlaylistType, Segment, SegmentByteRange, Variant},
};

const HEADER: &str = "#EXTM3U";

const TAG_VERSION: &str = "#EXT-X-VERSION:";
const TAG_TARGET_DURATION: &str = "#EXT-X-TARGETDURATION:";
const TAG_MEDIA_SEQUENCE: &str = "#EXT-X-MEDIA-SEQUENCE:";
const TAG_PLAYLIST_TYPE: &str = "#EXT-X-PLAYLIST-TYPE:";
const TAG_STREAM_INF: &str = "#EXT-X-STREAM-INF:";
const TAG_INF: &str = "#EXTINF:";
const TAG_BYTERANGE: &str = "#EXT-X-BYTERANGE:";
const TAG_KEY: &str = "#EXT-X-KEY";
const TAG_ENDLIST: &str = "#EXT-X-ENDLIST";
// Accepted for compatibility with some hand-written playlists.
const TAG_ENDLIST_LEGACY: &str = "#EndList";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing #EXTM3U in line 1")]
    MalformedHeader,

    #[error("invalid playlist type {value:?}, line: {line}")]
    InvalidPlaylistType { line: usize, value: String },

    #[error("invalid EXT-X-STREAM-INF URI, line: {line}")]
    InvalidVariantUri { line: usize },

    #[error("duplicate EXTINF, line: {line}")]
    DuplicateSegmentInfo { line: usize },

    #[error("duplicate EXT-X-BYTERANGE, line: {line}")]
    DuplicateByteRange { line: usize },

    #[error("invalid EXT-X-KEY method {method:?}, line: {line}")]
    InvalidKeyMethod { line: usize, method: String },

    #[error("invalid EXT-X-KEY without attributes, line: {line}")]
    InvalidKey { line: usize },

    #[error("EXT-X-KEY with AES-128 method but no URI, line: {line}")]
    MissingKeyUri { line: usize },

    #[error("invalid {tag} value {value:?}, line: {line}")]
    InvalidValue {
        line: usize,
        tag: &'static str,
        value: String,
    },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Fields collected for the segment whose URI line has not been seen yet.
#[derive(Default)]
struct PendingSegment {
    info: Option<(f32, Option<String>)>,
    byte_range: Option<SegmentByteRange>,
}

impl PendingSegment {
    fn finish(&mut self, uri: &str, key_index: usize) -> Option<Segment> {
        let byte_range = self.byte_range.take();
        let (duration, title) = self.info.take()?;
        Some(Segment {
            uri: uri.to_string(),
            duration,
            title,
            byte_range,
            key_index,
        })
    }
}

/// Parse the text of an M3U8 manifest.
///
/// The first line must be exactly `#EXTM3U`. Unknown tags and comments are skipped.
pub fn parse(text: &str) -> ParseResult<Playlist> {
    let mut lines = text.lines().map(str::trim).enumerate().map(|(i, l)| (i + 1, l));

    match lines.next() {
        Some((_, HEADER)) => {}
        _ => return Err(ParseError::MalformedHeader),
    }

    let mut playlist = Playlist::default();
    let mut pending = PendingSegment::default();
    let mut key_index = 0;

    while let Some((line_no, line)) = lines.next() {
        if line.is_empty() {
            continue;
        }

        if let Some(value) = line.strip_prefix(TAG_VERSION) {
            playlist.version = Some(parse_value(line_no, "EXT-X-VERSION", value)?);
        } else if let Some(value) = line.strip_prefix(TAG_TARGET_DURATION) {
            playlist.target_duration =
                Some(parse_value(line_no, "EXT-X-TARGETDURATION", value)?);
        } else if let Some(value) = line.strip_prefix(TAG_MEDIA_SEQUENCE) {
            playlist.media_sequence = parse_value(line_no, "EXT-X-MEDIA-SEQUENCE", value)?;
        } else if let Some(value) = line.strip_prefix(TAG_PLAYLIST_TYPE) {
            playlist.playlist_type = match value.trim() {
                "" => PlaylistType::Unspecified,
                "VOD" => PlaylistType::Vod,
                "EVENT" => PlaylistType::Event,
                other => {
                    return Err(ParseError::InvalidPlaylistType {
                        line: line_no,
                        value: other.to_string(),
                    })
                }
            };
        } else if let Some(value) = line.strip_prefix(TAG_STREAM_INF) {
            let mut variant = parse_variant(line_no, value)?;
            // the URI is the next non-blank line
            let uri = lines.by_ref().find(|(_, l)| !l.is_empty());
            match uri {
                Some((_, uri)) if !uri.starts_with('#') => variant.uri = uri.to_string(),
                Some((uri_line, _)) => {
                    return Err(ParseError::InvalidVariantUri { line: uri_line })
                }
                None => return Err(ParseError::InvalidVariantUri { line: line_no + 1 }),
            }
            playlist.variants.push(variant);
        } else if let Some(value) = line.strip_prefix(TAG_INF) {
            if pending.info.is_some() {
                return Err(ParseError::DuplicateSegmentInfo { line: line_no });
            }
            let (duration, title) = match value.split_once(',') {
                Some((duration, title)) => (duration, Some(title.trim())),
                None => (value, None),
            };
            let duration: f32 = parse_value(line_no, "EXTINF", duration)?;
            if duration.is_nan() || duration < 0. {
                return Err(ParseError::InvalidValue {
                    line: line_no,
                    tag: "EXTINF",
                    value: value.to_string(),
                });
            }
            let title = title.filter(|t| !t.is_empty()).map(str::to_string);
            pending.info = Some((duration, title));
        } else if let Some(value) = line.strip_prefix(TAG_BYTERANGE) {
            if pending.byte_range.is_some() {
                return Err(ParseError::DuplicateByteRange { line: line_no });
            }
            pending.byte_range = Some(parse_byte_range(line_no, value)?);
        } else if let Some(value) = line.strip_prefix(TAG_KEY) {
            let key = parse_key(line_no, value.strip_prefix(':').unwrap_or(value))?;
            key_index += 1;
            playlist.keys.insert(key_index, key);
        } else if line == TAG_ENDLIST || line == TAG_ENDLIST_LEGACY {
            playlist.end_list = true;
        } else if !line.starts_with('#') {
            // URI lines without a preceding EXTINF are not segments
            if let Some(segment) = pending.finish(line, key_index) {
                playlist.segments.push(segment);
            }
        } else {
            tracing::trace!("Ignored line {line_no}: {line}");
        }
    }

    Ok(playlist)
}

fn parse_value<T: FromStr>(line: usize, tag: &'static str, value: &str) -> ParseResult<T> {
    value.trim().parse().map_err(|_| ParseError::InvalidValue {
        line,
        tag,
        value: value.to_string(),
    })
}

fn parse_byte_range(line: usize, value: &str) -> ParseResult<SegmentByteRange> {
    let (length, offset) = match value.split_once('@') {
        Some((length, offset)) => (length, Some(offset)),
        None => (value, None),
    };

    Ok(SegmentByteRange {
        length: parse_value(line, "EXT-X-BYTERANGE", length)?,
        offset: offset
            .map(|offset| parse_value(line, "EXT-X-BYTERANGE", offset))
            .transpose()?,
    })
}

fn parse_key(line: usize, value: &str) -> ParseResult<Key> {
    let attrs = Attributes::parse(value);
    if attrs.is_empty() {
        return Err(ParseError::InvalidKey { line });
    }

    let method = match attrs.get("METHOD").unwrap_or_default() {
        "" => KeyMethod::Unspecified,
        "NONE" => KeyMethod::None,
        "AES-128" => KeyMethod::Aes128,
        other => {
            return Err(ParseError::InvalidKeyMethod {
                line,
                method: other.to_string(),
            })
        }
    };

    let uri = attrs.get("URI").map(str::to_string);
    if method == KeyMethod::Aes128 && uri.is_none() {
        return Err(ParseError::MissingKeyUri { line });
    }

    Ok(Key {
        method,
        uri,
        iv: attrs.get("IV").map(str::to_string),
    })
}

fn parse_variant(line: usize, value: &str) -> ParseResult<Variant> {
    let attrs = Attributes::parse(value);

    let mut variant = Variant::default();
    if let Some(bandwidth) = attrs.get("BANDWIDTH") {
        variant.bandwidth = parse_value(line, "BANDWIDTH", bandwidth)?;
    }
    if let Some(program_id) = attrs.get("PROGRAM-ID") {
        variant.program_id = Some(parse_value(line, "PROGRAM-ID", program_id)?);
    }
    if let Some(resolution) = attrs.get("RESOLUTION") {
        if let Some((width, height)) = resolution.split_once(['x', 'X']) {
            variant.width = width.parse().ok();
            variant.height = height.parse().ok();
        }
        variant.resolution = Some(resolution.to_string());
    }
    variant.codecs = attrs.get("CODECS").map(str::to_string);

    Ok(variant)
}
