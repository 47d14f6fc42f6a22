use crate::backup::archive::walkdir_globset::{default_globset, CustomDeserializedGlob};
use crate::backup::compress::CompressorConfig;
use crate::backup::host::{HostConfig, HostContext, StaticHost};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::{RetentionPolicy, DEFAULT_MAX_COUNT};
use crate::backup::store::StoreConfig;
use crate::backup::validate::{validate_bucket_name, validate_tag, validate_writable_dir};
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use validator::Validate;

static DEFAULT_TAG: &str = "backup";
static BUCKET_SUFFIX: &str = "-backups";

/// Everything a run needs besides the host identity. Every field is optional in YAML.
#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Builder, Getters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    /// Directory to back up, relative paths resolve against the working directory
    #[serde(default = "default_path")]
    #[builder(default = default_path(), into)]
    path: PathBuf,
    #[serde(default = "default_tag")]
    #[builder(default = default_tag(), into)]
    #[validate(custom(function = validate_tag))]
    tag: String,
    #[serde(default = "default_keep")]
    #[builder(default = default_keep())]
    keep: NonZeroUsize,
    /// Defaults to `<project id>-backups`
    #[builder(into)]
    #[validate(custom(function = validate_bucket_name))]
    bucket: Option<String>,
    /// Status lines are appended here in addition to stdout
    #[builder(into)]
    log_file: Option<PathBuf>,
    /// Where the archive blob is written, the system temp dir if unset
    #[builder(into)]
    #[validate(custom(function = validate_writable_dir))]
    work_dir: Option<PathBuf>,
    #[serde(default = "default_globset")]
    #[builder(default = default_globset())]
    globset: Vec<CustomDeserializedGlob>,
    #[serde(default)]
    #[builder(default)]
    compressor: CompressorConfig,
    #[serde(default)]
    #[builder(default)]
    store: StoreConfig,
    #[serde(default)]
    #[builder(default)]
    host: HostConfig,
}

fn default_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

fn default_keep() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_MAX_COUNT).unwrap_or(NonZeroUsize::MIN)
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Command line values that take precedence over the config file
#[derive(Clone, Debug, Default, Builder)]
pub struct ConfigOverrides {
    #[builder(into)]
    pub path: Option<PathBuf>,
    #[builder(into)]
    pub tag: Option<String>,
    pub keep: Option<NonZeroUsize>,
    #[builder(into)]
    pub bucket: Option<String>,
    #[builder(into)]
    pub log_file: Option<PathBuf>,
    #[builder(into)]
    pub machine_id: Option<String>,
    #[builder(into)]
    pub project_id: Option<String>,
}

impl BackupConfig {
    /// Reads the YAML config at `path`, or starts from defaults when there is none
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => File::open(path)
                .map_err(Error::from)
                .and_then(|f| serde_yml::from_reader::<_, BackupConfig>(f).map_err(Error::from))
                .with_msg(format!("Parse YAML config failed: {:?}", path)),
        }
    }

    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(path) = overrides.path {
            self.path = path;
        }
        if let Some(tag) = overrides.tag {
            self.tag = tag;
        }
        if let Some(keep) = overrides.keep {
            self.keep = keep;
        }
        if overrides.bucket.is_some() {
            self.bucket = overrides.bucket;
        }
        if overrides.log_file.is_some() {
            self.log_file = overrides.log_file;
        }
        if let (Some(machine_id), Some(project_id)) = (overrides.machine_id, overrides.project_id) {
            self.host = HostConfig::Static(
                StaticHost::builder()
                    .machine_id(machine_id)
                    .project_id(project_id)
                    .build(),
            );
        }
        self
    }

    /// Validates this config and every nested section
    pub fn validate_all(&self) -> Result<()> {
        self.validate()?;
        self.compressor.validate()?;
        self.store.validate()?;
        self.host.validate()?;
        Ok(())
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.keep)
    }

    pub fn bucket_name(&self, host: &HostContext) -> String {
        self.bucket
            .clone()
            .unwrap_or_else(|| format!("{}{}", host.project_id(), BUCKET_SUFFIX))
    }

    /// Absolute form of `path`; an unreadable path is an archive error
    pub fn resolved_path(&self) -> Result<PathBuf> {
        std::fs::canonicalize(&self.path).map_err(|e| Error::archive(&self.path, e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::store::local::LocalStoreConfig;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config: BackupConfig = serde_yml::from_str("{}").unwrap();
        assert_eq!(config, BackupConfig::default());
        assert_eq!(config.path(), Path::new("."));
        assert_eq!(config.tag(), "backup");
        assert_eq!(config.retention().max_count.get(), 10);
        assert_eq!(*config.compressor(), CompressorConfig::None);
        assert!(matches!(config.store(), StoreConfig::Gsutil(_)));
        assert!(matches!(config.host(), HostConfig::MetadataServer(_)));
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
path: /srv/data
tag: nightly
keep: 3
bucket: acme-archive
log_file: /var/log/backup.log
globset: ["**/*.db", "conf/*"]
compressor:
  compressor_type: xz
  level: 6
store:
  type: local
  root: /mnt/backups
host:
  type: static
  machine_id: "1234"
  project_id: acme
"#;
        let config: BackupConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.keep().get(), 3);
        assert_eq!(config.globset().len(), 2);
        assert_eq!(
            *config.store(),
            StoreConfig::Local(LocalStoreConfig::builder().root("/mnt/backups").build())
        );
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(serde_yml::from_str::<BackupConfig>("keep: 0\n").is_err());
        assert!(serde_yml::from_str::<BackupConfig>("unknown: 1\n").is_err());

        let bad_tag: BackupConfig = serde_yml::from_str("tag: a/b\n").unwrap();
        assert!(bad_tag.validate_all().is_err());

        let bad_bucket: BackupConfig = serde_yml::from_str("bucket: Bad_Bucket\n").unwrap();
        assert!(bad_bucket.validate_all().is_err());

        let bad_level: BackupConfig =
            serde_yml::from_str("compressor: {compressor_type: xz, level: 12}\n").unwrap();
        assert!(bad_level.validate_all().is_err());
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("backup.yml");
        std::fs::write(&file, "tag: weekly\n").unwrap();

        assert_eq!(BackupConfig::load(Some(file.as_path())).unwrap().tag(), "weekly");
        assert_eq!(BackupConfig::load(None).unwrap(), BackupConfig::default());

        let err = BackupConfig::load(Some(dir.path().join("missing.yml").as_path())).unwrap_err();
        assert!(err.to_string().contains("Parse YAML config failed"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = BackupConfig::builder()
            .tag("from-file")
            .bucket("file-bucket")
            .build()
            .apply_overrides(
                ConfigOverrides::builder()
                    .tag("from-cli")
                    .keep(NonZeroUsize::new(4).unwrap())
                    .machine_id("m")
                    .project_id("p")
                    .build(),
            );
        assert_eq!(config.tag(), "from-cli");
        assert_eq!(config.keep().get(), 4);
        assert_eq!(config.bucket().as_deref(), Some("file-bucket"));
        assert!(matches!(config.host(), HostConfig::Static(_)));
    }

    #[test]
    fn test_single_host_override_is_ignored() {
        let config = BackupConfig::default()
            .apply_overrides(ConfigOverrides::builder().machine_id("m").build());
        assert!(matches!(config.host(), HostConfig::MetadataServer(_)));
    }

    #[test]
    fn test_bucket_name_derived_from_project() {
        let host = HostContext::new("m", "acme-prod").unwrap();
        assert_eq!(BackupConfig::default().bucket_name(&host), "acme-prod-backups");
        let explicit = BackupConfig::builder().bucket("mine").build();
        assert_eq!(explicit.bucket_name(&host), "mine");
    }

    #[test]
    fn test_resolved_path() {
        let dir = TempDir::new().unwrap();
        let config = BackupConfig::builder().path(dir.path()).build();
        assert!(config.resolved_path().unwrap().is_absolute());

        let missing = BackupConfig::builder().path(dir.path().join("nope")).build();
        assert!(matches!(missing.resolved_path(), Err(Error::Archive { .. })));
    }
}
