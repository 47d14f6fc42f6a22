use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::store::{ObjectMetadata, ObjectStore, ObjectStoreBuilder};
use crate::backup::validate::validate_absolute_path;
use bon::Builder;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use validator::Validate;
use walkdir::WalkDir;

static METADATA_SUFFIX: &str = ".meta.json";
static TMP_SUFFIX: &str = ".tmp";

/// Object store kept in a local directory, e.g. a mounted bucket or a backup disk
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct LocalStoreConfig {
    #[validate(custom(function = validate_absolute_path))]
    #[builder(into)]
    root: PathBuf,
}

impl ObjectStoreBuilder for LocalStoreConfig {
    type Store = LocalStore;

    fn build_store(&self, bucket: &str) -> Result<LocalStore> {
        Ok(LocalStore {
            bucket_dir: self.root.join(bucket),
        })
    }
}

/// Objects live at `<root>/<bucket>/<key>`, metadata in a `<key>.meta.json` sidecar
#[derive(Debug)]
pub struct LocalStore {
    bucket_dir: PathBuf,
}

impl LocalStore {
    fn object_path(&self, key: &str) -> PathBuf {
        self.bucket_dir.join(key)
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.bucket_dir.join(format!("{key}{METADATA_SUFFIX}"))
    }

    fn key_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.bucket_dir).ok()?;
        Some(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .join("/"),
        )
    }
}

impl ObjectStore for LocalStore {
    fn ensure_bucket(&self) -> Result<()> {
        if !self.bucket_dir.is_dir() {
            tracing::info!("Creating bucket directory {:?}", self.bucket_dir);
            std::fs::create_dir_all(&self.bucket_dir)?;
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Only the directory holding the prefix' last segment can contain matches
        let search_dir = match prefix.rfind('/') {
            Some(idx) => self.bucket_dir.join(&prefix[..idx]),
            None => self.bucket_dir.clone(),
        };
        if !search_dir.is_dir() {
            return Ok(vec![]);
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&search_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = self.key_of(entry.path()) else {
                continue;
            };
            if key.starts_with(prefix)
                && !key.ends_with(METADATA_SUFFIX)
                && !key.ends_with(TMP_SUFFIX)
            {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn metadata(&self, key: &str) -> Result<ObjectMetadata> {
        let object_path = self.object_path(key);
        if !object_path.is_file() {
            return Err(Error::from(std::io::Error::new(
                ErrorKind::NotFound,
                format!("object {key:?} not found"),
            )));
        }

        match File::open(self.metadata_path(key)) {
            Ok(f) => serde_json::from_reader(BufReader::new(f))
                .map_err(Error::from)
                .with_msg(format!("Parse metadata of {key:?} failed")),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ObjectMetadata::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, src: &Path, metadata: &ObjectMetadata) -> Result<()> {
        let object_path = self.object_path(key);
        if let Some(parent) = object_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.bucket_dir.join(format!("{key}{TMP_SUFFIX}"));
        let res = std::fs::copy(src, &tmp_path)
            .and_then(|_| std::fs::rename(&tmp_path, &object_path))
            .map_err(Error::from);
        if let Err(mut e) = res {
            if let Err(e2) = std::fs::remove_file(&tmp_path) {
                if e2.kind() != ErrorKind::NotFound {
                    e = e.chain(e2.into());
                }
            }
            return Err(e.with_msg(format!("Upload of {key:?} failed")));
        }

        let mut writer = BufWriter::new(File::create(self.metadata_path(key))?);
        serde_json::to_writer(&mut writer, metadata)?;
        writer.flush()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        std::fs::remove_file(self.object_path(key))?;
        match std::fs::remove_file(self.metadata_path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
