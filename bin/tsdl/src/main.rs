use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use fake_user_agent::get_chrome_rua;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, COOKIE, USER_AGENT},
    ClientBuilder, Url,
};
use tsdl::{hls::VariantPolicy, Downloader, HttpClient};

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
enum Variant {
    /// Only the stream with the highest bandwidth
    #[default]
    Highest,
    /// Fall back to lower bandwidths when a stream can not be loaded
    Fallback,
}

impl From<Variant> for VariantPolicy {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Highest => VariantPolicy::Highest,
            Variant::Fallback => VariantPolicy::Fallback,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct TsdlArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,

    /// Maximum number of segments downloaded at the same time
    #[clap(short, long, default_value = "25")]
    concurrency: NonZeroU32,

    /// Retry limit of a single segment
    ///
    /// Segments are retried until they succeed when omitted.
    #[clap(long)]
    retries: Option<u32>,

    /// Request timeout in seconds
    #[clap(long, default_value = "60")]
    timeout: u64,

    /// Directory to write the output to
    #[clap(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Output file name without extension
    #[clap(short, long, default_value = "output")]
    name: String,

    /// Keep downloaded segments after merging
    #[clap(short, long)]
    keep_segments: bool,

    /// Set key manually
    ///
    /// Hex encoded AES-128 key used instead of the key URI in the playlist.
    #[clap(long)]
    key: Option<String>,

    /// Cookies used to download
    ///
    /// Sent with every request, including keys and segments on other hosts. eg. "a=1; b=2".
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP Header used to download
    ///
    /// Custom header. eg. "User-Agent: xxxxx". This option will override --cookies.
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Stream selection of master playlists
    #[clap(long, value_enum, default_value_t)]
    variant: Variant,

    /// m3u8 url
    m3u8: Url,
}

impl TsdlArgs {
    fn header_map(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(cookies) = &self.cookies {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(cookies.trim()).context("Invalid cookies")?,
            );
        }

        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .with_context(|| format!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim())
                    .with_context(|| format!("Invalid header name: {key}"))?,
                HeaderValue::from_str(value.trim())
                    .with_context(|| format!("Invalid header value: {value}"))?,
            );
        }
        Ok(headers)
    }

    fn client(&self) -> anyhow::Result<HttpClient> {
        let headers = self.header_map()?;
        let mut builder = ClientBuilder::new().timeout(Duration::from_secs(self.timeout));
        if !headers.contains_key(USER_AGENT) {
            builder = builder.user_agent(get_chrome_rua());
        }

        Ok(HttpClient::new(builder.default_headers(headers))?)
    }

    fn downloader(&self) -> Downloader {
        let mut downloader = Downloader::new()
            .concurrency(self.concurrency)
            .retries(self.retries)
            .variant_policy(self.variant.into())
            .output_dir(&self.output_dir)
            .name(&self.name)
            .keep_segments(self.keep_segments);
        if let Some(key) = &self.key {
            downloader = downloader.manual_key(key);
        }
        downloader
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = TsdlArgs::parse();

    let default_level = if args.verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = args.client()?;
    let output = args
        .downloader()
        .download(client, args.m3u8.clone())
        .await?;

    println!("{}", output.display());
    Ok(())
}
