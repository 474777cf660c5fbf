use thiserror::Error;

use crate::hls::ParseError;

#[derive(Error, Debug)]
pub enum TsdlError {
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("Invalid m3u8 file: {0}")]
    Parse(#[from] ParseError),

    #[error("Playlist contains neither segments nor variants")]
    EmptyPlaylist,

    #[error("Master playlist only references other master playlists")]
    UnsupportedNesting,

    #[error("Unsupported encryption method: {0}")]
    UnsupportedCryptMethod(String),

    #[error("Failed to fetch key {url}: {source}")]
    KeyFetchFailed {
        url: url::Url,
        #[source]
        source: Box<TsdlError>,
    },

    #[error("Key #{0} is declared with AES-128 but has no URI")]
    MissingKeyUri(usize),

    #[error("Invalid IV: {0}")]
    InvalidIv(String),

    #[error("Invalid manual key: {0}")]
    InvalidManualKey(String),

    #[error("Byte range of segment {0} exceeds the addressable size")]
    InvalidByteRange(usize),

    #[error("Media sequence number of segment {0} exceeds the maximum")]
    MediaSequenceOverflow(usize),

    #[error("Failed to fetch segment {index}: {source}")]
    SegmentFetchFailed {
        index: usize,
        #[source]
        source: Box<TsdlError>,
    },

    #[error("Failed to decode segment: {0}")]
    DecodeFailed(String),

    #[error("Missing segments: {0:?}")]
    IncompleteDownload(Vec<usize>),

    #[error("Segments abandoned after exceeding the retry limit: {0:?}")]
    SegmentsAbandoned(Vec<usize>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    HexDecodeError(#[from] hex::FromHexError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

pub type TsdlResult<T> = Result<T, TsdlError>;
