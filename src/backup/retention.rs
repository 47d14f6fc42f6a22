use crate::backup::identity::BackupRecord;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::convert_error_vec;
use crate::backup::store::ObjectStore;
use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

pub const DEFAULT_MAX_COUNT: usize = 10;

/// Keep at most `max_count` backups per identity
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[display("keep {max_count}")]
pub struct RetentionPolicy {
    pub max_count: NonZeroUsize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_MAX_COUNT).unwrap())
    }
}

impl RetentionPolicy {
    pub fn new(max_count: NonZeroUsize) -> Self {
        Self { max_count }
    }

    /// The oldest `len - max_count` records, oldest first; empty when within the limit
    pub fn get_delete<'a, I>(&self, records: I) -> Vec<&'a BackupRecord>
    where
        I: IntoIterator<Item = &'a BackupRecord>,
    {
        self.get_delete_pinned(records, None)
    }

    /// Like [`Self::get_delete`], but the record stored at `pinned` is never
    /// selected and always counts as one of the kept records.
    pub fn get_delete_pinned<'a, I>(
        &self,
        records: I,
        pinned: Option<&str>,
    ) -> Vec<&'a BackupRecord>
    where
        I: IntoIterator<Item = &'a BackupRecord>,
    {
        let (kept, candidates): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| Some(r.storage_key().as_str()) == pinned);
        let budget = self.max_count.get().saturating_sub(kept.len());
        let sorted = candidates
            .into_iter()
            .sorted_by(|a, b| a.timestamp().cmp(b.timestamp()))
            .collect_vec();
        let excess = sorted.len().saturating_sub(budget);
        sorted.into_iter().take(excess).collect_vec()
    }
}

#[derive(Debug, Default)]
pub struct RotationReport {
    pub deleted: Vec<String>,
    /// One deletion error per key that could not be removed
    pub failed: Option<Error>,
}

impl RotationReport {
    pub fn failed_count(&self) -> usize {
        match &self.failed {
            Some(Error::LotsOfError(v)) => v.len(),
            Some(_) => 1,
            None => 0,
        }
    }
}

/// Deletes everything `policy` selects from `records`, never the one at `pinned`.
///
/// A failing delete does not stop the remaining ones; failures are collected
/// in the report instead of being returned as an error.
pub fn rotate<S: ObjectStore + ?Sized>(
    store: &S,
    records: &[BackupRecord],
    policy: &RetentionPolicy,
    pinned: Option<&str>,
) -> RotationReport {
    let to_delete = policy.get_delete_pinned(records, pinned);
    if to_delete.is_empty() {
        tracing::info!(
            "{} backups present, {policy}, nothing to rotate",
            records.len()
        );
        return RotationReport::default();
    }

    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for record in to_delete {
        let key = record.storage_key();
        tracing::info!("Removing out of retention backup {key}");
        match store.delete(key) {
            Ok(()) => deleted.push(key.clone()),
            Err(e) => {
                tracing::error!("Removing {key} failed: {e}");
                errors.push(Error::deletion(key.as_str(), e));
            }
        }
    }

    let failed = convert_error_vec(errors).err();
    if failed.is_some() {
        tracing::warn!("Rotation finished with failed deletions, they will be retried next run");
    }
    RotationReport { deleted, failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::fingerprint::Fingerprint;
    use crate::backup::identity::BackupIdentity;
    use crate::backup::result_error::result::Result;
    use crate::backup::store::ObjectMetadata;
    use chrono::{DateTime, TimeZone, Utc};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::path::Path;

    fn identity() -> BackupIdentity {
        BackupIdentity::builder()
            .host_id("h")
            .absolute_path("/srv")
            .tag("backup")
            .build()
    }

    fn at(t: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + t, 0).unwrap()
    }

    fn records(times: &[i64]) -> Vec<BackupRecord> {
        times
            .iter()
            .map(|t| BackupRecord::new(identity(), at(*t), Fingerprint::of_bytes(t.to_string())))
            .collect()
    }

    fn policy(max: usize) -> RetentionPolicy {
        RetentionPolicy::new(NonZeroUsize::new(max).unwrap())
    }

    fn times(selected: &[&BackupRecord]) -> Vec<DateTime<Utc>> {
        selected.iter().map(|r| *r.timestamp()).collect()
    }

    #[derive(Default)]
    struct DeleteRecorder {
        failing: HashSet<String>,
        attempted: RefCell<Vec<String>>,
    }

    impl ObjectStore for DeleteRecorder {
        fn ensure_bucket(&self) -> Result<()> {
            unreachable!()
        }

        fn list(&self, _prefix: &str) -> Result<Vec<String>> {
            unreachable!()
        }

        fn metadata(&self, _key: &str) -> Result<ObjectMetadata> {
            unreachable!()
        }

        fn put(&self, _key: &str, _src: &Path, _metadata: &ObjectMetadata) -> Result<()> {
            unreachable!()
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.attempted.borrow_mut().push(key.to_string());
            if self.failing.contains(key) {
                Err(Error::from(std::io::Error::other("permission denied")))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_default_keeps_ten() {
        assert_eq!(RetentionPolicy::default().max_count.get(), 10);
    }

    #[test]
    fn test_within_limit_deletes_nothing() {
        for n in 0..=3 {
            let records = records(&(0..n).collect_vec());
            assert!(policy(3).get_delete(&records).is_empty());
        }
    }

    #[test]
    fn test_three_records_keep_two_deletes_oldest() {
        let records = records(&[1, 2, 3]);
        assert_eq!(times(&policy(2).get_delete(&records)), vec![at(1)]);
    }

    #[test]
    fn test_deletes_exactly_the_oldest_regardless_of_input_order() {
        let records = records(&[7, 3, 9, 1, 5, 2]);
        let selected = policy(2).get_delete(&records);
        assert_eq!(times(&selected), vec![at(1), at(2), at(3), at(5)]);
    }

    #[test]
    fn test_pinned_record_is_kept_even_when_oldest() {
        let records = records(&[5, 10, 11]);
        let pinned = records[0].storage_key().as_str();

        assert_eq!(times(&policy(2).get_delete_pinned(&records, Some(pinned))), vec![at(10)]);
        assert_eq!(
            times(&policy(1).get_delete_pinned(&records, Some(pinned))),
            vec![at(10), at(11)]
        );
        assert!(policy(3).get_delete_pinned(&records, Some(pinned)).is_empty());
    }

    #[test]
    fn test_rotate_continues_after_failure() {
        let records = records(&[1, 2, 3, 4, 5]);
        let store = DeleteRecorder {
            failing: HashSet::from([records[0].storage_key().clone()]),
            ..Default::default()
        };

        let report = rotate(&store, &records, &policy(2), None);

        assert_eq!(
            *store.attempted.borrow(),
            records[..3].iter().map(|r| r.storage_key().clone()).collect_vec()
        );
        assert_eq!(
            report.deleted,
            records[1..3].iter().map(|r| r.storage_key().clone()).collect_vec()
        );
        assert_eq!(report.failed_count(), 1);
        assert!(matches!(report.failed, Some(Error::LotsOfError(_))));
    }

    #[test]
    fn test_rotate_reports_every_failure() {
        let records = records(&[1, 2, 3]);
        let store = DeleteRecorder {
            failing: records.iter().map(|r| r.storage_key().clone()).collect(),
            ..Default::default()
        };

        let report = rotate(&store, &records, &policy(1), None);
        assert!(report.deleted.is_empty());
        assert_eq!(report.failed_count(), 2);
        assert_eq!(store.attempted.borrow().len(), 2);
    }

    #[test]
    fn test_rotate_within_limit_touches_nothing() {
        let records = records(&[1, 2]);
        let store = DeleteRecorder::default();
        let report = rotate(&store, &records, &policy(2), None);
        assert!(report.deleted.is_empty());
        assert!(report.failed.is_none());
        assert!(store.attempted.borrow().is_empty());
    }
}
