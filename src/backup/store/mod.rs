pub mod gsutil;
pub mod local;

use crate::backup::fingerprint::Fingerprint;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;
use crate::backup::store::gsutil::{GsutilConfig, GsutilStore};
use crate::backup::store::local::{LocalStore, LocalStoreConfig};
use derive_more::From;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::Path;
use validator::{Validate, ValidationErrors};

/// Metadata stored alongside every uploaded object
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub fingerprint: Option<Fingerprint>,
}

impl From<Fingerprint> for ObjectMetadata {
    fn from(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint: Some(fingerprint),
        }
    }
}

/// Client for one bucket of a remote object store.
///
/// Every call is attempted exactly once; implementations never retry.
pub trait ObjectStore {
    /// Creates the bucket if it does not exist yet
    fn ensure_bucket(&self) -> Result<()>;

    /// Keys starting with `prefix`, in no particular order
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn metadata(&self, key: &str) -> Result<ObjectMetadata>;

    fn put(&self, key: &str, src: &Path, metadata: &ObjectMetadata) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn ensure_bucket(&self) -> Result<()> {
        (**self).ensure_bucket()
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list(prefix)
    }

    fn metadata(&self, key: &str) -> Result<ObjectMetadata> {
        (**self).metadata(key)
    }

    fn put(&self, key: &str, src: &Path, metadata: &ObjectMetadata) -> Result<()> {
        (**self).put(key, src, metadata)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}

pub trait ObjectStoreBuilder {
    type Store: ObjectStore;

    fn build_store(&self, bucket: &str) -> Result<Self::Store>;
}

#[derive(From, Debug)]
pub enum Store {
    Gsutil(GsutilStore),
    Local(LocalStore),
}

impl ObjectStore for Store {
    fn ensure_bucket(&self) -> Result<()> {
        match self {
            Store::Gsutil(s) => s.ensure_bucket(),
            Store::Local(s) => s.ensure_bucket(),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        match self {
            Store::Gsutil(s) => s.list(prefix),
            Store::Local(s) => s.list(prefix),
        }
    }

    fn metadata(&self, key: &str) -> Result<ObjectMetadata> {
        match self {
            Store::Gsutil(s) => s.metadata(key),
            Store::Local(s) => s.metadata(key),
        }
    }

    fn put(&self, key: &str, src: &Path, metadata: &ObjectMetadata) -> Result<()> {
        match self {
            Store::Gsutil(s) => s.put(key, src, metadata),
            Store::Local(s) => s.put(key, src, metadata),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self {
            Store::Gsutil(s) => s.delete(key),
            Store::Local(s) => s.delete(key),
        }
    }
}

#[derive(Clone, From, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum StoreConfig {
    Gsutil(GsutilConfig),
    Local(LocalStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Gsutil(GsutilConfig::default())
    }
}

impl Validate for StoreConfig {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        match self {
            StoreConfig::Gsutil(inner) => inner.validate(),
            StoreConfig::Local(inner) => inner.validate(),
        }
    }
}

impl ObjectStoreBuilder for StoreConfig {
    type Store = Store;

    fn build_store(&self, bucket: &str) -> Result<Store> {
        match self {
            StoreConfig::Gsutil(c) => c.build_store(bucket).map(Store::from),
            StoreConfig::Local(c) => c.build_store(bucket).map(Store::from),
        }
        .with_debug_object_and_fn_name(self.clone(), "build_store")
    }
}
