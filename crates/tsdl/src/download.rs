mod queue;
mod scheduler;

pub use queue::{Next, QueueSnapshot, Requeue, SegmentState, TaskQueue};
pub use scheduler::{ScheduleSummary, Scheduler, DEFAULT_CONCURRENCY};

use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::Arc,
};

use reqwest::Url;

use crate::{
    checkpoint::{CheckpointStore, JsonCheckpoint},
    error::TsdlResult,
    fetch::Fetch,
    hls::{PlaylistResolver, VariantPolicy},
    merge::ConcatMerger,
    progress::{LogProgress, ProgressReporter},
    store::SegmentStore,
};

const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Resolves, downloads and merges one HLS stream.
pub struct Downloader {
    concurrency: NonZeroU32,
    retries: Option<u32>,
    policy: VariantPolicy,
    manual_key: Option<String>,

    output_dir: PathBuf,
    name: String,
    keep_segments: bool,

    reporter: Arc<dyn ProgressReporter>,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retries: None,
            policy: VariantPolicy::default(),
            manual_key: None,
            output_dir: PathBuf::from("."),
            name: "output".to_string(),
            keep_segments: false,
            reporter: Arc::new(LogProgress),
        }
    }

    pub fn concurrency(mut self, concurrency: NonZeroU32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn retries(mut self, retries: Option<u32>) -> Self {
        self.retries = retries;
        self
    }

    pub fn variant_policy(mut self, policy: VariantPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Hex encoded key used instead of fetching `AES-128` keys.
    pub fn manual_key(mut self, key: impl Into<String>) -> Self {
        self.manual_key = Some(key.into());
        self
    }

    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// File name of the output without extension.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn keep_segments(mut self, keep_segments: bool) -> Self {
        self.keep_segments = keep_segments;
        self
    }

    pub fn reporter(mut self, reporter: impl ProgressReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn output_file(&self) -> PathBuf {
        self.output_dir.join(format!("{}.ts", self.name))
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.output_dir.join(format!("{}_segments", self.name))
    }

    /// Download the stream at `url` and return the path of the merged file.
    pub async fn download<F>(&self, fetcher: F, url: Url) -> TsdlResult<PathBuf>
    where
        F: Fetch,
    {
        let fetcher = Arc::new(fetcher);

        let mut resolver = PlaylistResolver::new(fetcher.clone()).with_policy(self.policy);
        if let Some(key) = &self.manual_key {
            resolver = resolver.with_manual_key(key)?;
        }
        let playlist = Arc::new(resolver.resolve(url).await?);
        let total = playlist.len();

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let store = SegmentStore::new(self.segments_dir());
        let checkpoint = JsonCheckpoint::new(store.dir().join(CHECKPOINT_FILE));
        discard_stale_segments(&store, &checkpoint, playlist.url.as_str(), total).await?;

        let summary = Scheduler::new(fetcher, playlist, store.clone())
            .concurrency(self.concurrency)
            .retries(self.retries)
            .reporter(self.reporter.clone())
            .checkpoint(checkpoint)
            .run()
            .await?;
        tracing::debug!("{summary:?}");

        let merged = ConcatMerger::new(self.output_file())
            .keep_segments(self.keep_segments)
            .merge(&store, total)
            .await?;
        Ok(merged.output_file)
    }
}

/// Remove segments left behind by a download of a different playlist.
async fn discard_stale_segments(
    store: &SegmentStore,
    checkpoint: &impl CheckpointStore,
    url: &str,
    total: usize,
) -> TsdlResult<()> {
    if !store_exists(store.dir()).await {
        return Ok(());
    }

    match checkpoint.load().await? {
        Some(checkpoint) if checkpoint.matches(url, total) => {
            tracing::info!(
                "Resuming download, {} of {total} segments remaining.",
                checkpoint.remaining().len()
            );
        }
        _ => {
            tracing::warn!(
                "Segments in {} belong to another download, removed.",
                store.dir().display()
            );
            store.clear().await?;
        }
    }
    Ok(())
}

async fn store_exists(dir: &Path) -> bool {
    tokio::fs::try_exists(dir).await.unwrap_or_default()
}
