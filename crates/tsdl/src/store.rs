use std::path::{Path, PathBuf};

use tokio::{fs::File, io::AsyncWriteExt};

use crate::error::TsdlResult;

const SEGMENT_EXTENSION: &str = "ts";
const TEMP_SUFFIX: &str = "part";

/// Directory holding one file per downloaded segment, named by segment index.
///
/// Segments are written to a temporary file first and renamed into place, so a file
/// at [SegmentStore::segment_path] is always complete.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: PathBuf,
}

impl SegmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> TsdlResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{index:06}.{SEGMENT_EXTENSION}"))
    }

    fn temp_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{index:06}.{SEGMENT_EXTENSION}.{TEMP_SUFFIX}"))
    }

    /// Whether a completed file exists for `index`.
    pub async fn contains(&self, index: usize) -> bool {
        tokio::fs::metadata(self.segment_path(index))
            .await
            .map(|m| m.is_file())
            .unwrap_or_default()
    }

    /// Indices in `0..total` without a completed file.
    pub async fn missing(&self, total: usize) -> Vec<usize> {
        let mut missing = Vec::new();
        for index in 0..total {
            if !self.contains(index).await {
                missing.push(index);
            }
        }
        missing
    }

    /// Write `data` as the content of segment `index`, replacing it atomically.
    pub async fn write_segment(&self, index: usize, data: &[u8]) -> TsdlResult<()> {
        let temp_path = self.temp_path(index);
        let mut file = File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, self.segment_path(index)).await?;
        Ok(())
    }

    pub async fn open_segment(&self, index: usize) -> TsdlResult<File> {
        Ok(File::open(self.segment_path(index)).await?)
    }

    /// Remove the whole directory.
    pub async fn clear(&self) -> TsdlResult<()> {
        if tokio::fs::try_exists(&self.dir).await? {
            tokio::fs::remove_dir_all(&self.dir).await?;
        }
        Ok(())
    }
}
