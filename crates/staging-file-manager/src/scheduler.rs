//! Deferred, best-effort deletion of staged files.
//!
//! A single runner task owns a min-heap of deadlines. Callers push batches
//! through an unbounded channel and return immediately; the runner sleeps
//! until the earliest deadline, deletes every due batch and goes back to
//! waiting. Deletion errors are logged and swallowed.

use crate::staging::StagedFile;

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

/// Deadline used when `now + delay` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Anything the scheduler can delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTarget {
    path: PathBuf,
}

impl CleanupTarget {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl From<PathBuf> for CleanupTarget {
    fn from(path: PathBuf) -> Self {
        Self { path }
    }
}

impl From<&Path> for CleanupTarget {
    fn from(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl From<&PathBuf> for CleanupTarget {
    fn from(path: &PathBuf) -> Self {
        Self { path: path.clone() }
    }
}

impl From<StagedFile> for CleanupTarget {
    fn from(file: StagedFile) -> Self {
        Self { path: file.path }
    }
}

impl From<&StagedFile> for CleanupTarget {
    fn from(file: &StagedFile) -> Self {
        Self {
            path: file.path.clone(),
        }
    }
}

/// One `schedule` call waiting for its deadline.
#[derive(Debug)]
struct PendingBatch {
    due: Instant,
    /// Tie-breaker so equal deadlines are processed in submission order.
    sequence: u64,
    targets: Vec<CleanupTarget>,
}

impl PartialEq for PendingBatch {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for PendingBatch {}

impl PartialOrd for PendingBatch {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingBatch {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

/// Handle to the shared cleanup runner. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CleanupScheduler {
    tx: mpsc::UnboundedSender<PendingBatch>,
    sequence: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
}

impl CleanupScheduler {
    /// Spawn the runner task on the current tokio runtime.
    ///
    /// The runner keeps going until every handle is dropped and all batches
    /// already scheduled have been processed.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run(rx, pending.clone()));
        tracing::debug!("Cleanup scheduler started");

        Self {
            tx,
            sequence: Arc::new(AtomicU64::new(0)),
            pending,
        }
    }

    /// Delete `targets` once `delay` has elapsed. Never blocks, never fails.
    pub fn schedule<I, T>(&self, targets: I, delay: Duration)
    where
        I: IntoIterator<Item = T>,
        T: Into<CleanupTarget>,
    {
        let targets: Vec<CleanupTarget> = targets.into_iter().map(Into::into).collect();
        if targets.is_empty() {
            return;
        }

        let count = targets.len();
        let batch = PendingBatch {
            due: deadline(delay),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            targets,
        };

        self.pending.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(batch).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            tracing::warn!("Cleanup runner is gone; {} path(s) will not be removed", count);
            return;
        }

        tracing::debug!(
            "Scheduled cleanup of {} path(s) in {}s",
            count,
            delay.as_secs()
        );
    }

    /// Number of scheduled batches not yet processed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

fn deadline(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

async fn run(mut rx: mpsc::UnboundedReceiver<PendingBatch>, pending: Arc<AtomicUsize>) {
    let mut queue: BinaryHeap<Reverse<PendingBatch>> = BinaryHeap::new();
    let mut accepting = true;

    loop {
        let now = Instant::now();
        while queue.peek().is_some_and(|Reverse(batch)| batch.due <= now) {
            if let Some(Reverse(batch)) = queue.pop() {
                remove_targets(&batch.targets).await;
                pending.fetch_sub(1, Ordering::Relaxed);
            }
        }

        if !accepting && queue.is_empty() {
            break;
        }

        let next_due = queue.peek().map(|Reverse(batch)| batch.due);

        tokio::select! {
            received = rx.recv(), if accepting => match received {
                Some(batch) => queue.push(Reverse(batch)),
                None => accepting = false,
            },
            () = wait_until(next_due) => {}
        }
    }

    tracing::debug!("Cleanup scheduler stopped");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn remove_targets(targets: &[CleanupTarget]) {
    for target in targets {
        let path = target.path();
        let result = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => tracing::debug!("Removed expired file: {}", path.display()),
            Err(e) => tracing::debug!("Cleanup of {} skipped: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(50);

    fn touch(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, name).unwrap();
        path
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test]
    async fn test_removes_after_delay() {
        let temp_dir = tempfile::tempdir().unwrap();
        let a = touch(&temp_dir, "a.txt");
        let b = touch(&temp_dir, "b.txt");

        let scheduler = CleanupScheduler::start();
        scheduler.schedule([&a, &b], SHORT);

        assert!(a.exists(), "deletion must be deferred");
        settle().await;

        assert!(!a.exists());
        assert!(!b.exists());
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_keeps_files_until_deadline() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = touch(&temp_dir, "later.txt");

        let scheduler = CleanupScheduler::start();
        scheduler.schedule([path.clone()], Duration::from_secs(30));
        settle().await;

        assert!(path.exists());
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn test_later_batch_does_not_block_earlier_deadline() {
        let temp_dir = tempfile::tempdir().unwrap();
        let slow = touch(&temp_dir, "slow.txt");
        let fast = touch(&temp_dir, "fast.txt");

        let scheduler = CleanupScheduler::start();
        scheduler.schedule([slow.clone()], Duration::from_secs(30));
        scheduler.schedule([fast.clone()], SHORT);
        settle().await;

        assert!(!fast.exists());
        assert!(slow.exists());
    }

    #[tokio::test]
    async fn test_missing_paths_are_ignored() {
        let temp_dir = tempfile::tempdir().unwrap();
        let real = touch(&temp_dir, "real.txt");
        let ghost = temp_dir.path().join("never-existed.txt");

        let scheduler = CleanupScheduler::start();
        scheduler.schedule([ghost.clone(), real.clone()], SHORT);
        // Same path twice: the second attempt fails quietly.
        scheduler.schedule([real.clone()], SHORT);
        settle().await;

        assert!(!real.exists());
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_accepts_staged_file_descriptors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = touch(&temp_dir, "staged.bin");
        let staged = StagedFile {
            path: path.clone(),
            size_bytes: 10,
        };

        let scheduler = CleanupScheduler::start();
        scheduler.schedule([staged], SHORT);
        settle().await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_removes_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("extracted");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested/file.txt"), "x").unwrap();

        let scheduler = CleanupScheduler::start();
        scheduler.schedule([dir.clone()], SHORT);
        settle().await;

        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_drains_after_handles_dropped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = touch(&temp_dir, "orphan.txt");

        let scheduler = CleanupScheduler::start();
        scheduler.schedule([path.clone()], SHORT);
        drop(scheduler);
        settle().await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_queued() {
        let scheduler = CleanupScheduler::start();
        scheduler.schedule(Vec::<PathBuf>::new(), SHORT);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_unrepresentable_delay_is_clamped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = touch(&temp_dir, "forever.txt");

        let scheduler = CleanupScheduler::start();
        scheduler.schedule([path.clone()], Duration::from_secs(i64::MAX as u64));
        scheduler.schedule([path.clone()], Duration::MAX);
        settle().await;

        assert!(path.exists());
        assert_eq!(scheduler.pending(), 2);
    }
}
