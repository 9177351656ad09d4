//! Delete-after-verified-copy reconciliation.
//!
//! A local file is removed if and only if the copy tool reported that exact
//! path as a successfully copied, file-typed object in the current run.

use std::fs;
use std::io;

use crate::protocol::TransferRecord;
use crate::summary::RunSummary;

/// Summary of one pass plus the read error that cut it short, if any.
///
/// Files already deleted before a read error are still counted in `summary`.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub summary: RunSummary,
    pub read_error: Option<io::Error>,
}

/// Consume records, deleting each confirmed upload's local source.
pub fn reconcile<I>(records: I) -> Reconciliation
where
    I: IntoIterator<Item = io::Result<TransferRecord>>,
{
    let mut outcome = Reconciliation::default();

    for record in records {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                outcome.read_error = Some(err);
                break;
            }
        };

        if !record.is_confirmed_file_copy() {
            continue;
        }

        let path = record.source_path();
        match fs::remove_file(&path) {
            Ok(()) => outcome.summary.add_deleted(record.object.size),
            Err(err) => {
                log::debug!("failed to delete {}: {}", path.display(), err);
                outcome
                    .summary
                    .add_failed_deletion(record.object.size, path);
            }
        }
    }

    debug_assert!(outcome.summary.is_balanced());
    outcome
}
