/// Snapshot taken whenever a segment is stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Index of the segment that was just stored.
    pub index: usize,
    /// Size of the stored segment after decoding.
    pub bytes: usize,
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            0.
        } else {
            self.completed as f32 / self.total as f32 * 100.
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

/// Receives a [Progress] after every stored segment.
///
/// Called from download tasks, so implementations should return quickly.
pub trait ProgressReporter: Send + Sync + 'static {
    fn report(&self, progress: Progress);
}

impl<F> ProgressReporter for F
where
    F: Fn(Progress) + Send + Sync + 'static,
{
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

/// Writes every [Progress] to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, progress: Progress) {
        let Progress {
            index,
            completed,
            total,
            ..
        } = progress;
        tracing::info!(
            "Processing segment {index} finished. ({completed} / {total} or {percentage:.2}%)",
            percentage = progress.percentage()
        );
    }
}
