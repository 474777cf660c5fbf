use reqwest::StatusCode;
use tsdl::{
    codec::{sequence_iv, Codec},
    hls::{parse, resolve, KeyMethod, PlaylistResolver, VariantPolicy},
    ByteRange, TsdlError,
};

use crate::source::TestFetcher;

const SIMPLE: &str = include_str!("../fixtures/hls/rfc8216/8-1-simple-media-playlist.m3u8");
const ENCRYPTED: &str =
    include_str!("../fixtures/hls/rfc8216/8-3-playlist-with-encrypted-media-segments.m3u8");
const MASTER: &str = include_str!("../fixtures/hls/rfc8216/8-4-master-playlist.m3u8");
const BYTE_RANGE: &str = include_str!("../fixtures/hls/byte-range-playlist.m3u8");

#[tokio::test]
async fn rfc8216_8_1_simple_media_playlist() -> anyhow::Result<()> {
    let playlist = parse(SIMPLE)?;
    assert_eq!(playlist.version, Some(3));
    assert_eq!(playlist.target_duration, Some(10.));
    assert!(playlist.end_list);
    assert!(!playlist.is_master());

    let fetcher = TestFetcher::new();
    fetcher.serve("http://media.example.com/playlist.m3u8", SIMPLE);
    let resolved = resolve(fetcher, "http://media.example.com/playlist.m3u8".parse()?).await?;

    assert_eq!(resolved.len(), 3);
    assert!(!resolved.is_empty());
    assert_eq!(
        resolved.segments[0].url,
        "http://media.example.com/first.ts".parse()?
    );
    assert_eq!(resolved.segments[0].media_sequence, 0);
    assert_eq!(
        resolved.segments[1].url,
        "http://media.example.com/second.ts".parse()?
    );
    assert_eq!(
        resolved.segments[2].url,
        "http://media.example.com/third.ts".parse()?
    );
    assert!(resolved.keys.is_empty());
    assert!((resolved.total_duration() - 21.021).abs() < 1e-3);

    Ok(())
}

#[tokio::test]
async fn rfc8216_8_3_playlist_with_encrypted_media_segments() -> anyhow::Result<()> {
    let playlist = parse(ENCRYPTED)?;
    assert_eq!(playlist.media_sequence, 7794);
    assert_eq!(playlist.keys.len(), 2);
    assert_eq!(playlist.keys[&1].method, KeyMethod::Aes128);
    let key_indices: Vec<_> = playlist.segments.iter().map(|s| s.key_index).collect();
    assert_eq!(key_indices, vec![1, 1, 1, 2]);

    let fetcher = TestFetcher::new();
    fetcher
        .serve("https://priv.example.com/playlist.m3u8", ENCRYPTED)
        .serve("https://priv.example.com/key.php?r=52", vec![0x52; 16])
        .serve("https://priv.example.com/key.php?r=53", vec![0x53; 16]);

    let resolved = resolve(
        fetcher.clone(),
        "https://priv.example.com/playlist.m3u8".parse()?,
    )
    .await?;

    assert_eq!(resolved.len(), 4);
    assert_eq!(resolved.keys.len(), 2);
    assert_eq!(fetcher.requests("https://priv.example.com/key.php?r=52"), 1);
    assert_eq!(fetcher.requests("https://priv.example.com/key.php?r=53"), 1);

    let last = &resolved.segments[3];
    assert_eq!(last.media_sequence, 7797);
    assert_eq!(
        resolved.codec(last)?,
        Codec::Aes128 {
            key: [0x53; 16],
            iv: sequence_iv(7797),
        }
    );
    assert_eq!(
        resolved.codec(&resolved.segments[0])?,
        Codec::Aes128 {
            key: [0x52; 16],
            iv: sequence_iv(7794),
        }
    );

    Ok(())
}

#[tokio::test]
async fn rfc8216_8_4_master_playlist() -> anyhow::Result<()> {
    let playlist = parse(MASTER)?;
    assert!(playlist.is_master());
    assert_eq!(playlist.variants.len(), 4);
    assert_eq!(playlist.variants[3].codecs.as_deref(), Some("mp4a.40.5"));

    let fetcher = TestFetcher::new();
    fetcher
        .serve("http://example.com/master.m3u8", MASTER)
        .serve("http://example.com/hi.m3u8", SIMPLE)
        .serve("http://example.com/mid.m3u8", SIMPLE);

    let resolved = resolve(fetcher.clone(), "http://example.com/master.m3u8".parse()?).await?;
    assert_eq!(resolved.url, "http://example.com/hi.m3u8".parse()?);
    assert_eq!(resolved.len(), 3);
    assert_eq!(fetcher.requests("http://example.com/mid.m3u8"), 0);

    Ok(())
}

#[tokio::test]
async fn master_playlist_variant_fallback() -> anyhow::Result<()> {
    let fetcher = TestFetcher::new();
    fetcher
        .serve("http://example.com/master.m3u8", MASTER)
        .serve("http://example.com/mid.m3u8", SIMPLE);

    // the best stream is gone
    let result = PlaylistResolver::new(fetcher.clone())
        .resolve("http://example.com/master.m3u8".parse()?)
        .await;
    assert!(matches!(
        result,
        Err(TsdlError::HttpStatus(status)) if status == StatusCode::NOT_FOUND
    ));

    let resolved = PlaylistResolver::new(fetcher.clone())
        .with_policy(VariantPolicy::Fallback)
        .resolve("http://example.com/master.m3u8".parse()?)
        .await?;
    assert_eq!(resolved.url, "http://example.com/mid.m3u8".parse()?);
    assert_eq!(fetcher.requests("http://example.com/low.m3u8"), 0);

    Ok(())
}

#[tokio::test]
async fn byte_range_offsets_follow_previous_range() -> anyhow::Result<()> {
    let fetcher = TestFetcher::new();
    fetcher.serve("http://media.example.com/br/index.m3u8", BYTE_RANGE);

    let resolved = resolve(fetcher, "http://media.example.com/br/index.m3u8".parse()?).await?;
    let ranges: Vec<_> = resolved.segments.iter().map(|s| s.byte_range).collect();
    assert_eq!(
        ranges,
        vec![
            Some(ByteRange::new(0, Some(75232))),
            Some(ByteRange::new(75232, Some(82112))),
            Some(ByteRange::new(157344, Some(69864))),
        ]
    );
    assert!(resolved
        .segments
        .iter()
        .all(|s| s.url.as_str() == "http://media.example.com/br/segment.ts"));

    Ok(())
}
