use std::{future::Future, path::PathBuf};

use serde::{Deserialize, Serialize};
use tokio::{io::AsyncWriteExt, sync::Mutex};

use crate::error::TsdlResult;

/// State of an interrupted download, written next to its segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Media playlist the segments belong to.
    pub url: String,
    pub total: usize,
    /// Indices already stored, ascending.
    pub completed: Vec<usize>,
}

impl Checkpoint {
    pub fn remaining(&self) -> Vec<usize> {
        (0..self.total)
            .filter(|i| self.completed.binary_search(i).is_err())
            .collect()
    }

    /// Whether segments of this checkpoint can be reused for a playlist at `url` with `total` segments.
    pub fn matches(&self, url: &str, total: usize) -> bool {
        self.url == url && self.total == total
    }
}

pub trait CheckpointStore: Send + Sync + 'static {
    fn load(&self) -> impl Future<Output = TsdlResult<Option<Checkpoint>>> + Send;

    fn persist(&self, checkpoint: &Checkpoint) -> impl Future<Output = TsdlResult<()>> + Send;
}

/// Disables checkpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCheckpoint;

impl CheckpointStore for NoCheckpoint {
    async fn load(&self) -> TsdlResult<Option<Checkpoint>> {
        Ok(None)
    }

    async fn persist(&self, _checkpoint: &Checkpoint) -> TsdlResult<()> {
        Ok(())
    }
}

/// Stores a [Checkpoint] as a JSON file.
#[derive(Debug)]
pub struct JsonCheckpoint {
    path: PathBuf,
    /// Number of completed segments in the last written checkpoint.
    written: Mutex<Option<usize>>,
}

impl JsonCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: Mutex::new(None),
        }
    }
}

impl CheckpointStore for JsonCheckpoint {
    async fn load(&self) -> TsdlResult<Option<Checkpoint>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&data) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                tracing::warn!(
                    "Ignored broken checkpoint {}: {e}",
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    async fn persist(&self, checkpoint: &Checkpoint) -> TsdlResult<()> {
        let mut written = self.written.lock().await;
        // snapshots may arrive out of order from concurrent tasks
        if written.is_some_and(|w| w > checkpoint.completed.len()) {
            return Ok(());
        }

        let temp_path = self.path.with_extension("json.part");
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&serde_json::to_vec(checkpoint)?).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&temp_path, &self.path).await?;

        *written = Some(checkpoint.completed.len());
        Ok(())
    }
}
