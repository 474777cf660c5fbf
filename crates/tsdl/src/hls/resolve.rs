use std::collections::HashMap;

use bytes::Bytes;
use reqwest::Url;

use super::{parse, KeyMethod, Playlist, Segment};
use crate::{
    codec::{parse_iv, sequence_iv, Codec, AES_128_KEY_SIZE},
    error::{TsdlError, TsdlResult},
    fetch::Fetch,
    util::range::ByteRange,
};

/// How a variant is chosen from a master playlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VariantPolicy {
    /// Only try the variant with the highest bandwidth.
    #[default]
    Highest,
    /// Try variants from the highest bandwidth down until one can be loaded.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ResolvedSegment {
    /// Position of the segment in its media playlist.
    pub index: usize,
    pub segment: Segment,
    /// Absolute URL of the segment.
    pub url: Url,
    /// Byte range with its offset filled in when the playlist omitted it.
    pub byte_range: Option<ByteRange>,
    /// `EXT-X-MEDIA-SEQUENCE` plus the index.
    pub media_sequence: u64,
}

#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub url: Url,
    pub key: Bytes,
    pub iv: Option<[u8; 16]>,
}

/// A media playlist whose URIs are absolute and whose keys have been fetched.
#[derive(Debug, Clone)]
pub struct ResolvedPlaylist {
    /// URL of the media playlist, after following a master playlist.
    pub url: Url,
    pub segments: Vec<ResolvedSegment>,
    /// Key material by key index. Only keys which need decryption are present.
    pub keys: HashMap<usize, ResolvedKey>,
}

impl ResolvedPlaylist {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn key(&self, segment: &ResolvedSegment) -> Option<&ResolvedKey> {
        self.keys.get(&segment.segment.key_index)
    }

    /// Codec to decode the body of `segment` with.
    pub fn codec(&self, segment: &ResolvedSegment) -> TsdlResult<Codec> {
        match self.key(segment) {
            Some(key) => {
                let iv = key
                    .iv
                    .unwrap_or_else(|| sequence_iv(segment.media_sequence));
                Codec::aes128(&key.key, &iv)
            }
            None => Ok(Codec::Plain),
        }
    }

    pub fn total_duration(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.segment.duration as f64)
            .sum()
    }
}

/// Resolve `uri` found in a playlist located at `base`.
///
/// Absolute `http(s)` URLs are kept, absolute paths are joined to the host of `base`
/// and everything else is joined to the directory of `base`.
pub fn resolve_uri(base: &Url, uri: &str) -> TsdlResult<Url> {
    let uri = uri.trim();
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Ok(Url::parse(uri)?);
    }
    Ok(base.join(uri)?)
}

/// Turns a manifest URL into a [ResolvedPlaylist].
pub struct PlaylistResolver<F> {
    fetcher: F,
    policy: VariantPolicy,
    manual_key: Option<Bytes>,
}

impl<F> PlaylistResolver<F>
where
    F: Fetch,
{
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            policy: VariantPolicy::default(),
            manual_key: None,
        }
    }

    pub fn with_policy(mut self, policy: VariantPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use a hex encoded key instead of fetching `AES-128` keys.
    pub fn with_manual_key(mut self, key: &str) -> TsdlResult<Self> {
        let bytes = hex::decode(key.trim())
            .map_err(|_| TsdlError::InvalidManualKey(key.to_string()))?;
        if bytes.len() != AES_128_KEY_SIZE {
            return Err(TsdlError::InvalidManualKey(key.to_string()));
        }
        self.manual_key = Some(Bytes::from(bytes));
        Ok(self)
    }

    pub async fn resolve(&self, url: Url) -> TsdlResult<ResolvedPlaylist> {
        tracing::info!("Start fetching M3U8 file.");
        let playlist = self.load(&url).await?;
        tracing::info!("M3U8 file fetched.");

        let (url, playlist) = if playlist.is_master() {
            tracing::info!("Master playlist input detected. Selecting stream by bandwidth.");
            self.select_variant(&url, &playlist).await?
        } else {
            (url, playlist)
        };

        if playlist.segments.is_empty() {
            return Err(TsdlError::EmptyPlaylist);
        }
        self.resolve_media(url, playlist).await
    }

    async fn load(&self, url: &Url) -> TsdlResult<Playlist> {
        let bytes = self.fetcher.fetch(url, None).await?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(parse(&text)?)
    }

    async fn select_variant(&self, url: &Url, master: &Playlist) -> TsdlResult<(Url, Playlist)> {
        let mut variants = master.variants_by_bandwidth();
        if self.policy == VariantPolicy::Highest {
            variants.truncate(1);
        }

        let mut last_error = None;
        for variant in variants {
            let variant_url = resolve_uri(url, &variant.uri)?;
            tracing::info!(
                "Selected stream: {variant_url}; Bandwidth: {bandwidth}",
                bandwidth = variant.bandwidth
            );

            let error = match self.load(&variant_url).await {
                Ok(playlist) if playlist.is_master() => {
                    tracing::warn!("Stream {variant_url} is a master playlist, skipped.");
                    continue;
                }
                Ok(playlist) if playlist.segments.is_empty() => TsdlError::EmptyPlaylist,
                Ok(playlist) => return Ok((variant_url, playlist)),
                Err(e) => e,
            };

            if self.policy == VariantPolicy::Highest {
                return Err(error);
            }
            tracing::warn!("Failed to load stream {variant_url}, trying next one. {error}");
            last_error = Some(error);
        }

        Err(last_error.unwrap_or(TsdlError::UnsupportedNesting))
    }

    /// Resolve URIs, byte ranges and keys of a media playlist located at `url`.
    pub async fn resolve_media(&self, url: Url, playlist: Playlist) -> TsdlResult<ResolvedPlaylist> {
        let mut keys = HashMap::new();
        let mut segments = Vec::with_capacity(playlist.segments.len());
        let mut next_offsets: HashMap<String, u64> = HashMap::new();

        for (index, segment) in playlist.segments.iter().enumerate() {
            if let Some(key) = playlist.key_of(segment) {
                let key_index = segment.key_index;
                match &key.method {
                    KeyMethod::Unspecified | KeyMethod::None => {}
                    KeyMethod::Aes128 if keys.contains_key(&key_index) => {}
                    KeyMethod::Aes128 => {
                        let uri = key
                            .uri
                            .as_deref()
                            .ok_or(TsdlError::MissingKeyUri(key_index))?;
                        let key_url = resolve_uri(&url, uri)?;
                        let key_bytes = match &self.manual_key {
                            Some(manual_key) => manual_key.clone(),
                            None => {
                                tracing::debug!("Fetching key #{key_index} from {key_url}");
                                self.fetcher.fetch(&key_url, None).await.map_err(|e| {
                                    TsdlError::KeyFetchFailed {
                                        url: key_url.clone(),
                                        source: Box::new(e),
                                    }
                                })?
                            }
                        };
                        let iv = key.iv.as_deref().map(parse_iv).transpose()?;
                        keys.insert(
                            key_index,
                            ResolvedKey {
                                url: key_url,
                                key: key_bytes,
                                iv,
                            },
                        );
                    }
                    KeyMethod::Other(method) => {
                        return Err(TsdlError::UnsupportedCryptMethod(method.clone()))
                    }
                }
            }

            let byte_range = match segment.byte_range {
                Some(range) => {
                    let offset = range
                        .offset
                        .or_else(|| next_offsets.get(&segment.uri).copied())
                        .unwrap_or(0);
                    let end = offset
                        .checked_add(range.length)
                        .ok_or(TsdlError::InvalidByteRange(index))?;
                    next_offsets.insert(segment.uri.clone(), end);
                    Some(ByteRange::new(offset, Some(range.length)))
                }
                None => None,
            };

            let media_sequence = u64::try_from(index)
                .ok()
                .and_then(|index| playlist.media_sequence.checked_add(index))
                .ok_or(TsdlError::MediaSequenceOverflow(index))?;

            segments.push(ResolvedSegment {
                index,
                url: resolve_uri(&url, &segment.uri)?,
                segment: segment.clone(),
                byte_range,
                media_sequence,
            });
        }

        tracing::info!(
            "Resolved {} segments with {} key(s).",
            segments.len(),
            keys.len()
        );
        Ok(ResolvedPlaylist {
            url,
            segments,
            keys,
        })
    }
}

/// Fetch `url` and resolve it with the default policy.
pub async fn resolve<F>(fetcher: F, url: Url) -> TsdlResult<ResolvedPlaylist>
where
    F: Fetch,
{
    PlaylistResolver::new(fetcher).resolve(url).await
}
