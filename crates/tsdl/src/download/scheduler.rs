use std::{
    num::NonZeroU32,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    sync::{oneshot, Semaphore},
    time::MissedTickBehavior,
};

use super::queue::{Next, Requeue, TaskQueue};
use crate::{
    checkpoint::{Checkpoint, CheckpointStore, NoCheckpoint},
    error::{TsdlError, TsdlResult},
    fetch::Fetch,
    hls::ResolvedPlaylist,
    progress::{LogProgress, Progress, ProgressReporter},
    store::SegmentStore,
};

pub const DEFAULT_CONCURRENCY: NonZeroU32 = match NonZeroU32::new(25) {
    Some(n) => n,
    None => unreachable!(),
};

/// How often the checkpoint is written while segments are completing.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a successful [Scheduler::run].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub total: usize,
    /// Segments already stored by an earlier run.
    pub skipped: usize,
    pub downloaded: usize,
}

/// Downloads every segment of a [ResolvedPlaylist] into a [SegmentStore].
///
/// At most `concurrency` segments are in flight. A segment that fails is pushed back to
/// the tail of the queue and retried after the rest, until `retries` is exhausted.
pub struct Scheduler<F, C = NoCheckpoint> {
    fetcher: Arc<F>,
    playlist: Arc<ResolvedPlaylist>,
    store: Arc<SegmentStore>,

    concurrency: NonZeroU32,
    retries: Option<u32>,
    reporter: Arc<dyn ProgressReporter>,
    checkpoint: Arc<C>,
}

impl<F> Scheduler<F, NoCheckpoint>
where
    F: Fetch,
{
    pub fn new(fetcher: Arc<F>, playlist: Arc<ResolvedPlaylist>, store: SegmentStore) -> Self {
        Self {
            fetcher,
            playlist,
            store: Arc::new(store),
            concurrency: DEFAULT_CONCURRENCY,
            retries: None,
            reporter: Arc::new(LogProgress),
            checkpoint: Arc::new(NoCheckpoint),
        }
    }
}

impl<F, C> Scheduler<F, C>
where
    F: Fetch,
    C: CheckpointStore,
{
    pub fn concurrency(mut self, concurrency: NonZeroU32) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Maximum retries per segment. `None` retries until the segment succeeds.
    pub fn retries(mut self, retries: Option<u32>) -> Self {
        self.retries = retries;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn checkpoint<C2>(self, checkpoint: C2) -> Scheduler<F, C2>
    where
        C2: CheckpointStore,
    {
        Scheduler {
            fetcher: self.fetcher,
            playlist: self.playlist,
            store: self.store,
            concurrency: self.concurrency,
            retries: self.retries,
            reporter: self.reporter,
            checkpoint: Arc::new(checkpoint),
        }
    }

    pub async fn run(self) -> TsdlResult<ScheduleSummary> {
        let total = self.playlist.len();
        self.store.ensure_dir().await?;

        let mut stored = Vec::new();
        for index in 0..total {
            if self.store.contains(index).await {
                stored.push(index);
            }
        }
        let skipped = stored.len();
        if skipped > 0 {
            tracing::info!("{skipped} segments already downloaded, skipped.");
        }

        let queue = Arc::new(TaskQueue::with_done(total, self.retries, stored));
        let permits = Arc::new(Semaphore::new(self.concurrency.get() as usize));
        let fatal: Arc<Mutex<Option<TsdlError>>> = Arc::new(Mutex::new(None));

        let (stop_saver, stopped) = oneshot::channel();
        let saver = tokio::spawn(save_checkpoints(
            queue.clone(),
            self.checkpoint.clone(),
            self.playlist.url.to_string(),
            stopped,
        ));

        tracing::info!(
            "Start downloading {} segments with {} thread(s).",
            total - skipped,
            self.concurrency.get()
        );

        loop {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };

            let changed = queue.changed();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if has_fatal(&fatal) {
                break;
            }

            match queue.next() {
                Next::Got(index) => {
                    let task = SegmentTask {
                        fetcher: self.fetcher.clone(),
                        playlist: self.playlist.clone(),
                        store: self.store.clone(),
                    };
                    let queue = queue.clone();
                    let reporter = self.reporter.clone();
                    let fatal = fatal.clone();

                    tokio::spawn(async move {
                        let result = task.download(index).await;
                        match result {
                            Ok(bytes) => {
                                queue.complete(index);
                                reporter.report(Progress {
                                    index,
                                    bytes,
                                    completed: queue.completed(),
                                    total: queue.total(),
                                });
                            }
                            Err(e) if is_recoverable(&e) => match queue.requeue(index) {
                                Requeue::Requeued { failures } => {
                                    tracing::warn!(
                                        "Processing segment {index} failed ({failures} time(s)), retry later. {e}"
                                    );
                                }
                                Requeue::Abandoned => {
                                    tracing::error!(
                                        "Processing segment {index} failed, max retries exceed, drop. {e}"
                                    );
                                }
                                Requeue::Ignored => {}
                            },
                            Err(e) => {
                                tracing::error!("Processing segment {index} failed: {e}");
                                fatal
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .get_or_insert(e);
                                queue.wake();
                            }
                        }

                        // drop permit to release the semaphore
                        drop(permit);
                    });
                }
                Next::EmptyPending => {
                    drop(permit);
                    changed.await;
                }
                Next::EmptyDone => break,
            }
        }

        // wait for all tasks to finish
        let _ = permits.acquire_many(self.concurrency.get()).await;

        // the saver writes a last checkpoint once every task has settled
        let _ = stop_saver.send(());
        if let Err(e) = saver.await {
            tracing::warn!("Checkpoint task failed: {e}");
        }

        if let Some(e) = fatal_error(&fatal) {
            return Err(e);
        }

        let abandoned = queue.snapshot().abandoned;
        if !abandoned.is_empty() {
            tracing::error!("Failed to download {} segments:", abandoned.len());
            for index in abandoned.iter() {
                tracing::error!("  - {}", self.playlist.segments[*index].url);
            }
            return Err(TsdlError::SegmentsAbandoned(abandoned));
        }

        tracing::info!("All segments downloaded.");
        Ok(ScheduleSummary {
            total,
            skipped,
            downloaded: queue.completed() - skipped,
        })
    }
}

/// Persist the completed indices every [CHECKPOINT_INTERVAL] until `stopped` fires.
async fn save_checkpoints<C>(
    queue: Arc<TaskQueue>,
    checkpoint: Arc<C>,
    url: String,
    mut stopped: oneshot::Receiver<()>,
) where
    C: CheckpointStore,
{
    let mut ticker = tokio::time::interval(CHECKPOINT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut saved = None;

    loop {
        let stop = tokio::select! {
            _ = ticker.tick() => false,
            _ = &mut stopped => true,
        };

        if saved != Some(queue.completed()) {
            let snapshot = Checkpoint {
                url: url.clone(),
                total: queue.total(),
                completed: queue.snapshot().done,
            };
            match checkpoint.persist(&snapshot).await {
                Ok(()) => saved = Some(snapshot.completed.len()),
                Err(e) => tracing::warn!("Failed to save checkpoint: {e}"),
            }
        }

        if stop {
            break;
        }
    }
}

fn has_fatal(fatal: &Mutex<Option<TsdlError>>) -> bool {
    fatal
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

fn fatal_error(fatal: &Mutex<Option<TsdlError>>) -> Option<TsdlError> {
    fatal.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Errors worth another attempt. Anything else, such as a full disk, stops the download.
fn is_recoverable(error: &TsdlError) -> bool {
    matches!(
        error,
        TsdlError::SegmentFetchFailed { .. } | TsdlError::DecodeFailed(_)
    )
}

struct SegmentTask<F> {
    fetcher: Arc<F>,
    playlist: Arc<ResolvedPlaylist>,
    store: Arc<SegmentStore>,
}

impl<F> SegmentTask<F>
where
    F: Fetch,
{
    /// Fetch, decode and store one segment. Returns the stored size.
    async fn download(&self, index: usize) -> TsdlResult<usize> {
        let segment = &self.playlist.segments[index];

        let data = self
            .fetcher
            .fetch(&segment.url, segment.byte_range)
            .await
            .map_err(|e| TsdlError::SegmentFetchFailed {
                index,
                source: Box::new(e),
            })?;
        let data = self.playlist.codec(segment)?.decode(data)?;

        self.store.write_segment(index, &data).await?;
        Ok(data.len())
    }
}
