use std::path::{Path, PathBuf};

use tokio::{fs::File, io::AsyncWriteExt};

use crate::{
    error::{TsdlError, TsdlResult},
    store::SegmentStore,
};

/// Concatenates every stored segment, in index order, into a single file.
///
/// Nothing is written unless every segment is present. The output is assembled in a
/// temporary file next to the final path and renamed once complete.
pub struct ConcatMerger {
    output_file: PathBuf,
    keep_segments: bool,
}

/// Outcome of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub output_file: PathBuf,
    pub segments: usize,
    pub bytes: u64,
}

impl ConcatMerger {
    pub fn new(output_file: impl Into<PathBuf>) -> Self {
        Self {
            output_file: output_file.into(),
            keep_segments: false,
        }
    }

    /// Keep the segment directory after merging.
    pub fn keep_segments(mut self, keep_segments: bool) -> Self {
        self.keep_segments = keep_segments;
        self
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    fn temp_file(&self) -> PathBuf {
        let mut name = self
            .output_file
            .file_stem()
            .unwrap_or_default()
            .to_os_string();
        name.push(".part");
        self.output_file.with_file_name(name)
    }

    /// Merge segments `0..total` of `store`.
    pub async fn merge(&self, store: &SegmentStore, total: usize) -> TsdlResult<MergeSummary> {
        let missing = store.missing(total).await;
        if !missing.is_empty() {
            tracing::error!(
                "Can not merge: {} of {total} segments are missing.",
                missing.len()
            );
            return Err(TsdlError::IncompleteDownload(missing));
        }

        tracing::info!("Merging chunks...");
        let temp_file = self.temp_file();
        let bytes = match concat_segments(store, total, &temp_file).await {
            Ok(bytes) => bytes,
            Err(e) => {
                _ = tokio::fs::remove_file(&temp_file).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&temp_file, &self.output_file).await?;

        if !self.keep_segments {
            store.clear().await?;
        }

        tracing::info!(
            "All finished. Please checkout your files at {}",
            self.output_file.display()
        );
        Ok(MergeSummary {
            output_file: self.output_file.clone(),
            segments: total,
            bytes,
        })
    }
}

async fn concat_segments(store: &SegmentStore, total: usize, output: &Path) -> TsdlResult<u64> {
    let mut output = File::create(output).await?;
    let mut offset = 0;
    for index in 0..total {
        let mut segment = store.open_segment(index).await?;
        let size = tokio::io::copy(&mut segment, &mut output).await?;
        tracing::trace!("Segment {index} written at offset {offset} ({size} bytes).");
        offset += size;
    }
    output.flush().await?;
    output.sync_all().await?;
    Ok(offset)
}
