use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaylistType {
    #[default]
    Unspecified,
    Vod,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMethod {
    /// `METHOD` attribute was absent or empty.
    Unspecified,
    None,
    Aes128,
    Other(String),
}

/// `#EXT-X-KEY:METHOD=AES-128,URI="key.key",IV=0x...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub method: KeyMethod,
    pub uri: Option<String>,
    pub iv: Option<String>,
}

/// `#EXT-X-BYTERANGE:<length>[@<offset>]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentByteRange {
    pub length: u64,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub uri: String,
    pub duration: f32,
    pub title: Option<String>,
    pub byte_range: Option<SegmentByteRange>,
    /// Index into [Playlist::keys]. `0` means the segment is not encrypted.
    pub key_index: usize,
}

/// An entry of a master playlist.
///
/// `#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=240000,RESOLUTION=416x234,CODECS="avc1.42e00a,mp4a.40.2"`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variant {
    pub uri: String,
    pub bandwidth: u64,
    pub program_id: Option<u64>,
    pub resolution: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codecs: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    pub version: Option<u8>,
    pub target_duration: Option<f64>,
    pub media_sequence: u64,
    pub playlist_type: PlaylistType,
    pub end_list: bool,
    pub segments: Vec<Segment>,
    pub variants: Vec<Variant>,
    pub keys: HashMap<usize, Key>,
}

impl Playlist {
    pub fn is_master(&self) -> bool {
        !self.variants.is_empty()
    }

    /// Key used by `segment`, if it references one.
    pub fn key_of(&self, segment: &Segment) -> Option<&Key> {
        if segment.key_index == 0 {
            return None;
        }
        self.keys.get(&segment.key_index)
    }

    /// Variants ordered by bandwidth, highest first.
    pub fn variants_by_bandwidth(&self) -> Vec<&Variant> {
        let mut variants: Vec<_> = self.variants.iter().collect();
        variants.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
        variants
    }
}
