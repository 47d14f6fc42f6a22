use crate::backup::fingerprint::Fingerprint;
use crate::backup::identity::BackupRecord;
use crate::backup::result_error::error::Error;
use crate::backup::store::ObjectStore;

/// Upload unless the most recent backup has the same fingerprint
pub fn should_upload(new: &Fingerprint, prior: Option<&Fingerprint>) -> bool {
    match prior {
        None => true,
        Some(prior) => prior != new,
    }
}

/// Fingerprint stored with `latest`, `None` when there is no prior backup.
///
/// Lookup failures and objects without a stored fingerprint are logged and
/// treated as "no known prior", so the run uploads rather than skips.
pub fn prior_fingerprint<S: ObjectStore + ?Sized>(
    store: &S,
    latest: Option<&BackupRecord>,
) -> Option<Fingerprint> {
    let latest = latest?;
    if let Some(fingerprint) = latest.fingerprint() {
        return Some(fingerprint.clone());
    }

    let key = latest.storage_key();
    match store.metadata(key) {
        Ok(metadata) => {
            if metadata.fingerprint.is_none() {
                tracing::warn!("Latest backup {key} has no stored fingerprint, uploading anyway");
            }
            metadata.fingerprint
        }
        Err(e) => {
            let e = Error::lookup(key.as_str(), e);
            tracing::warn!("{e}\nTreating as no prior backup");
            None
        }
    }
}
