use std::path::PathBuf;

/// Bytes in one reported megabyte (MiB).
pub const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Outcome of one or more reconciliation passes.
///
/// A single run produces one of these; the scheduler folds them into windowed
/// and session totals with [`RunSummary::accumulate`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files_transferred: u64,
    pub files_deleted: u64,
    pub total_bytes: u64,
    pub failed_deletions: Vec<PathBuf>,
}

impl RunSummary {
    /// Count a confirmed upload whose local copy was removed.
    pub fn add_deleted(&mut self, bytes: u64) {
        self.files_transferred += 1;
        self.files_deleted += 1;
        self.total_bytes += bytes;
    }

    /// Count a confirmed upload whose local copy could not be removed.
    pub fn add_failed_deletion(&mut self, bytes: u64, path: PathBuf) {
        self.files_transferred += 1;
        self.total_bytes += bytes;
        self.failed_deletions.push(path);
    }

    /// Pointwise sum of counters; failed deletions are appended in order.
    pub fn accumulate(&mut self, from: &RunSummary) {
        self.files_transferred += from.files_transferred;
        self.files_deleted += from.files_deleted;
        self.total_bytes += from.total_bytes;
        self.failed_deletions
            .extend(from.failed_deletions.iter().cloned());
    }

    pub fn failed_count(&self) -> u64 {
        self.failed_deletions.len() as u64
    }

    pub fn megabytes(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_MEGABYTE
    }

    /// Percentage of transferred files that were also removed locally.
    pub fn success_rate(&self) -> f64 {
        if self.files_transferred == 0 {
            return 0.0;
        }
        self.files_deleted as f64 / self.files_transferred as f64 * 100.0
    }

    pub fn is_empty(&self) -> bool {
        self.files_transferred == 0
    }

    /// Every transferred file is either deleted or listed as failed, never both.
    pub fn is_balanced(&self) -> bool {
        self.files_deleted + self.failed_count() == self.files_transferred
    }
}
