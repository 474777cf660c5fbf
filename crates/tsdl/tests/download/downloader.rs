use std::{num::NonZeroU32, time::Duration};

use tsdl::{
    checkpoint::{Checkpoint, CheckpointStore, JsonCheckpoint},
    codec::{sequence_iv, Codec},
    Downloader, HttpClient, TsdlError,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{hls::HlsMock, with_timeout};

const KEY: [u8; 16] = *b"0123456789abcdef";

fn client() -> HttpClient {
    HttpClient::new(reqwest::Client::builder().timeout(Duration::from_secs(10))).unwrap()
}

fn segment_body(index: usize) -> Vec<u8> {
    (0..188 * (index + 1)).map(|i| (i * 7 + index) as u8).collect()
}

fn media_playlist(count: usize, encrypted: bool) -> String {
    let mut playlist = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:100\n");
    if encrypted {
        playlist.push_str("#EXT-X-KEY:METHOD=AES-128,URI=\"/key\"\n");
    }
    for index in 0..count {
        playlist.push_str(&format!("#EXTINF:6.0,\nsegments/{index}.ts\n"));
    }
    playlist.push_str("#EXT-X-ENDLIST\n");
    playlist
}

/// Mount an encrypted stream with `count` segments at `/index.m3u8`.
async fn mount_encrypted_stream(server: &MockServer, count: usize) {
    server
        .mock("/index.m3u8", media_playlist(count, true))
        .await
        .mock_bytes("/key", KEY.to_vec())
        .await;

    for index in 0..count {
        let codec = Codec::aes128(&KEY, &sequence_iv(100 + index as u64)).unwrap();
        server
            .mock_bytes(
                &format!("/segments/{index}.ts"),
                codec.encode(&segment_body(index)).to_vec(),
            )
            .await;
    }
}

fn expected_output(count: usize) -> Vec<u8> {
    (0..count).flat_map(segment_body).collect()
}

#[tokio::test]
async fn test_download_encrypted_stream() -> anyhow::Result<()> {
    const COUNT: usize = 12;
    let server = MockServer::start().await;
    mount_encrypted_stream(&server, COUNT).await;

    let temp = tempfile::tempdir()?;
    let downloader = Downloader::new()
        .concurrency(NonZeroU32::new(4).unwrap())
        .output_dir(temp.path())
        .name("encrypted");

    let output = with_timeout(
        downloader.download(client(), format!("{}/index.m3u8", server.uri()).parse()?),
    )
    .await?;

    assert_eq!(output, temp.path().join("encrypted.ts"));
    assert_eq!(tokio::fs::read(&output).await?, expected_output(COUNT));
    assert!(!downloader.segments_dir().exists());
    assert!(!temp.path().join("encrypted.part").exists());

    Ok(())
}

#[tokio::test]
async fn test_transient_errors_are_retried() -> anyhow::Result<()> {
    const COUNT: usize = 4;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/segments/2.ts"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_encrypted_stream(&server, COUNT).await;

    let temp = tempfile::tempdir()?;
    let output = with_timeout(
        Downloader::new()
            .output_dir(temp.path())
            .download(client(), format!("{}/index.m3u8", server.uri()).parse()?),
    )
    .await?;

    assert_eq!(output, temp.path().join("output.ts"));
    assert_eq!(tokio::fs::read(&output).await?, expected_output(COUNT));

    Ok(())
}

#[tokio::test]
async fn test_undecodable_segment_is_retried() -> anyhow::Result<()> {
    const COUNT: usize = 3;
    let server = MockServer::start().await;
    // not a whole number of cipher blocks
    Mock::given(method("GET"))
        .and(path("/segments/1.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xab; 15]))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_encrypted_stream(&server, COUNT).await;

    let temp = tempfile::tempdir()?;
    let output = with_timeout(
        Downloader::new()
            .output_dir(temp.path())
            .retries(Some(1))
            .download(client(), format!("{}/index.m3u8", server.uri()).parse()?),
    )
    .await?;

    assert_eq!(tokio::fs::read(&output).await?, expected_output(COUNT));
    let segment_requests = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == "/segments/1.ts")
        .count();
    assert_eq!(segment_requests, 2);

    Ok(())
}

#[tokio::test]
async fn test_resume_after_abandoned_segment() -> anyhow::Result<()> {
    const COUNT: usize = 5;
    let server = MockServer::start().await;
    server.mock_status("/segments/3.ts", 404).await;
    mount_encrypted_stream(&server, COUNT).await;

    let temp = tempfile::tempdir()?;
    let downloader = Downloader::new()
        .output_dir(temp.path())
        .retries(Some(1));
    let url: reqwest::Url = format!("{}/index.m3u8", server.uri()).parse()?;

    let result = with_timeout(downloader.download(client(), url.clone())).await;
    assert!(matches!(
        result,
        Err(TsdlError::SegmentsAbandoned(abandoned)) if abandoned == vec![3]
    ));
    assert!(!downloader.output_file().exists());

    let checkpoint = JsonCheckpoint::new(downloader.segments_dir().join("checkpoint.json"))
        .load()
        .await?
        .expect("checkpoint is written");
    assert_eq!(checkpoint.url, url.as_str());
    assert_eq!(checkpoint.remaining(), vec![3]);

    // the broken segment comes back, nothing else is downloaded again
    server.reset().await;
    server
        .mock("/index.m3u8", media_playlist(COUNT, true))
        .await
        .mock_bytes("/key", KEY.to_vec())
        .await;
    let codec = Codec::aes128(&KEY, &sequence_iv(103))?;
    Mock::given(method("GET"))
        .and(path("/segments/3.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(codec.encode(&segment_body(3)).to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let output = with_timeout(downloader.download(client(), url)).await?;
    assert_eq!(tokio::fs::read(&output).await?, expected_output(COUNT));

    Ok(())
}

#[tokio::test]
async fn test_segments_of_another_stream_are_discarded() -> anyhow::Result<()> {
    const COUNT: usize = 3;
    let server = MockServer::start().await;
    mount_encrypted_stream(&server, COUNT).await;

    let temp = tempfile::tempdir()?;
    let downloader = Downloader::new().output_dir(temp.path()).name("stale");

    // leftovers of a different download under the same name
    let segments_dir = downloader.segments_dir();
    tokio::fs::create_dir_all(&segments_dir).await?;
    tokio::fs::write(segments_dir.join("000000.ts"), b"garbage").await?;
    JsonCheckpoint::new(segments_dir.join("checkpoint.json"))
        .persist(&Checkpoint {
            url: "http://elsewhere.example.com/index.m3u8".to_string(),
            total: COUNT,
            completed: vec![0],
        })
        .await?;

    let output = with_timeout(
        downloader.download(client(), format!("{}/index.m3u8", server.uri()).parse()?),
    )
    .await?;
    assert_eq!(tokio::fs::read(&output).await?, expected_output(COUNT));

    Ok(())
}

#[tokio::test]
async fn test_keep_segments() -> anyhow::Result<()> {
    const COUNT: usize = 2;
    let server = MockServer::start().await;
    mount_encrypted_stream(&server, COUNT).await;

    let temp = tempfile::tempdir()?;
    let downloader = Downloader::new()
        .output_dir(temp.path().join("nested/out"))
        .keep_segments(true);

    let output = with_timeout(
        downloader.download(client(), format!("{}/index.m3u8", server.uri()).parse()?),
    )
    .await?;

    assert_eq!(tokio::fs::read(&output).await?, expected_output(COUNT));
    assert_eq!(
        tokio::fs::read(downloader.segments_dir().join("000001.ts")).await?,
        segment_body(1)
    );

    Ok(())
}
