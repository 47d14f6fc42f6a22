use crate::backup::fingerprint::Fingerprint;
use crate::backup::host::HostContext;
use bon::Builder;
use chrono::{DateTime, NaiveDateTime, Utc};
use getset::Getters;
use itertools::Itertools;
use std::path::{Component, Path, PathBuf};

/// Fixed width so that lexicographic order equals chronological order
static TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const TIME_LEN: usize = 16;

/// The (host, path, tag) triple that scopes a rotation group
#[derive(Clone, Debug, PartialEq, Eq, Hash, Builder, Getters)]
#[getset(get = "pub")]
pub struct BackupIdentity {
    #[builder(into)]
    host_id: String,
    #[builder(into)]
    absolute_path: PathBuf,
    #[builder(into)]
    tag: String,
}

impl BackupIdentity {
    pub fn for_host<P: Into<PathBuf>, S: Into<String>>(host: &HostContext, path: P, tag: S) -> Self {
        Self::builder()
            .host_id(host.machine_id().as_str())
            .absolute_path(path)
            .tag(tag)
            .build()
    }

    /// `<host_id>/<path segments>/<tag>-`, the prefix shared by every key of this identity
    pub fn key_prefix(&self) -> String {
        let segments = std::iter::once(self.host_id.clone())
            .chain(path_segments(&self.absolute_path))
            .filter(|s| !s.is_empty())
            .join("/");
        format!("{}/{}-", segments, self.tag)
    }

    pub fn storage_key(&self, timestamp: &DateTime<Utc>) -> String {
        format!("{}{}", self.key_prefix(), format_timestamp(timestamp))
    }

    /// Parses a key back into its timestamp, `None` when the key belongs to another identity
    pub fn timestamp_of_key(&self, key: &str) -> Option<DateTime<Utc>> {
        key.strip_prefix(self.key_prefix().as_str())
            .and_then(parse_timestamp)
    }

    /// Records of this identity among `keys`, oldest first
    pub fn records_from_keys<I, S>(&self, keys: I) -> Vec<BackupRecord>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .filter_map(|key| {
                let key = key.as_ref();
                self.timestamp_of_key(key).map(|timestamp| BackupRecord {
                    identity: self.clone(),
                    timestamp,
                    fingerprint: None,
                    storage_key: key.to_string(),
                })
            })
            .sorted_unstable_by(|a, b| a.timestamp.cmp(&b.timestamp))
            .dedup_by(|a, b| a.storage_key == b.storage_key)
            .collect_vec()
    }
}

fn path_segments(path: &Path) -> impl Iterator<Item = String> + '_ {
    path.components().filter_map(|c| match c {
        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
        _ => None,
    })
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIME_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.len() != TIME_LEN {
        return None;
    }
    NaiveDateTime::parse_from_str(s, TIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

/// A single uploaded backup, immutable once created
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct BackupRecord {
    identity: BackupIdentity,
    timestamp: DateTime<Utc>,
    /// Only known for records created in this run or looked up explicitly
    fingerprint: Option<Fingerprint>,
    storage_key: String,
}

impl BackupRecord {
    pub fn new(identity: BackupIdentity, timestamp: DateTime<Utc>, fingerprint: Fingerprint) -> Self {
        let storage_key = identity.storage_key(&timestamp);
        Self {
            identity,
            timestamp,
            fingerprint: Some(fingerprint),
            storage_key,
        }
    }
}
