//! One backup invocation: archive, detect change, upload, rotate.

use crate::backup::archive::create_archive;
use crate::backup::archive::walkdir_globset::WalkdirAndGlobsetSource;
use crate::backup::backup_config::BackupConfig;
use crate::backup::change::{prior_fingerprint, should_upload};
use crate::backup::host::HostContextSource;
use crate::backup::identity::{BackupIdentity, BackupRecord};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::{rotate, RotationReport};
use crate::backup::store::{ObjectMetadata, ObjectStore, ObjectStoreBuilder};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

#[derive(Debug)]
pub enum RunOutcome {
    /// Content matches the most recent backup, nothing was uploaded or rotated
    Unchanged { latest_key: String },
    Uploaded {
        record: BackupRecord,
        rotation: RotationReport,
    },
}

pub fn run_backup<H, B>(
    config: &BackupConfig,
    host_source: &H,
    store_builder: &B,
    now: DateTime<Utc>,
) -> Result<RunOutcome>
where
    H: HostContextSource + ?Sized,
    B: ObjectStoreBuilder + ?Sized,
{
    let host = host_source
        .host_context()
        .with_msg("Resolve host identity failed")?;

    let target = config.resolved_path()?;
    let identity = BackupIdentity::for_host(&host, &target, config.tag().as_str());
    info!("Backing up {:?} as {}", target, identity.key_prefix());

    let source = WalkdirAndGlobsetSource::builder()
        .src_dir(target.clone())
        .globset(config.globset().clone())
        .build();
    let archive = create_archive(
        &target,
        &source,
        config.compressor(),
        config.work_dir().as_deref(),
    )?;

    let bucket = config.bucket_name(&host);
    let store = store_builder.build_store(&bucket)?;
    store
        .ensure_bucket()
        .with_msg(format!("Ensure bucket {bucket:?} failed"))?;

    let existing = list_records(&store, &identity).unwrap_or_else(|e| {
        warn!("{e}\nTreating as no prior backup");
        vec![]
    });
    let latest = existing.last();
    let prior = prior_fingerprint(&store, latest);
    if !should_upload(archive.fingerprint(), prior.as_ref()) {
        let latest_key = latest.map(|r| r.storage_key().clone()).unwrap_or_default();
        info!("Content unchanged since {latest_key}, skipping upload");
        return Ok(RunOutcome::Unchanged { latest_key });
    }

    let record = BackupRecord::new(identity.clone(), now, archive.fingerprint().clone());
    let key = record.storage_key();
    info!("Uploading {:?} to {bucket}/{key}", archive.path());
    store
        .put(key, archive.path(), &ObjectMetadata::from(archive.fingerprint().clone()))
        .with_msg(format!("Upload of {key:?} failed"))?;
    info!("Uploaded backup {key}");

    let records = list_records(&store, &identity)?;
    let rotation = rotate(&store, &records, &config.retention(), Some(key.as_str()));
    Ok(RunOutcome::Uploaded { record, rotation })
}

fn list_records<S: ObjectStore + ?Sized>(
    store: &S,
    identity: &BackupIdentity,
) -> Result<Vec<BackupRecord>> {
    let prefix = identity.key_prefix();
    store
        .list(&prefix)
        .map(|keys| identity.records_from_keys(keys))
        .map_err(|e| Error::lookup(prefix, e))
}
