//! Google Cloud Storage access through the `gsutil` command line tool.
//!
//! Authentication is whatever `gsutil` is configured with. All parsing of the
//! tool's text output stays in this module.

use crate::backup::fingerprint::Fingerprint;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::store::{ObjectMetadata, ObjectStore, ObjectStoreBuilder};
use crate::backup::validate::validate_bucket_name;
use bon::Builder;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use validator::Validate;

static FINGERPRINT_METADATA_KEY: &str = "fingerprint";
static NO_MATCH_TEXT: &str = "matched no objects";
/// gsutil expands these in object URLs, even for `cp` destinations
const WILDCARD_CHARS: [char; 4] = ['*', '?', '[', ']'];

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct GsutilConfig {
    #[serde(default = "default_gsutil_bin")]
    #[builder(default = default_gsutil_bin(), into)]
    gsutil_bin: PathBuf,
    /// Location used when the bucket has to be created
    #[builder(into)]
    location: Option<String>,
}

fn default_gsutil_bin() -> PathBuf {
    PathBuf::from("gsutil")
}

impl Default for GsutilConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ObjectStoreBuilder for GsutilConfig {
    type Store = GsutilStore;

    fn build_store(&self, bucket: &str) -> Result<GsutilStore> {
        validate_bucket_name(bucket).map_err(|e| {
            let mut errors = validator::ValidationErrors::new();
            errors.add("bucket", e);
            Error::from(errors)
        })?;
        Ok(GsutilStore {
            config: self.clone(),
            bucket: bucket.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct GsutilStore {
    config: GsutilConfig,
    bucket: String,
}

impl GsutilStore {
    fn bucket_url(&self) -> String {
        format!("gs://{}", self.bucket)
    }

    fn object_url(&self, key: &str) -> Result<String> {
        if key.contains(WILDCARD_CHARS) {
            return Err(Error::WildcardKey(key.to_string()));
        }
        Ok(format!("gs://{}/{}", self.bucket, key))
    }

    fn command(&self) -> Command {
        Command::new(&self.config.gsutil_bin)
    }
}

impl ObjectStore for GsutilStore {
    fn ensure_bucket(&self) -> Result<()> {
        let mut probe = self.command();
        probe.arg("ls").arg("-b").arg(self.bucket_url());
        let out = run_command_output(&mut probe)?;
        if out.status.success() {
            return Ok(());
        }
        tracing::info!("Bucket {} not found, creating it", self.bucket_url());

        let mut create = self.command();
        create.arg("mb");
        if let Some(location) = &self.config.location {
            create.arg("-l").arg(location);
        }
        create.arg(self.bucket_url());
        run_command_capture(create).map(|_| ())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut cmd = self.command();
        cmd.arg("ls").arg(format!("{}*", self.object_url(prefix)?));
        let out = run_command_output(&mut cmd)?;
        if !out.status.success() {
            let summary = command_summary(&out);
            if summary.contains(NO_MATCH_TEXT) {
                return Ok(vec![]);
            }
            return Err(command_error(&cmd, summary));
        }
        Ok(parse_ls_output(
            &self.bucket,
            &String::from_utf8_lossy(&out.stdout),
        ))
    }

    fn metadata(&self, key: &str) -> Result<ObjectMetadata> {
        let mut cmd = self.command();
        cmd.arg("stat").arg(self.object_url(key)?);
        let stdout = run_command_capture(cmd)?;
        parse_stat_output(&stdout)
    }

    fn put(&self, key: &str, src: &Path, metadata: &ObjectMetadata) -> Result<()> {
        let url = self.object_url(key)?;
        let mut cmd = self.command();
        if let Some(fingerprint) = &metadata.fingerprint {
            cmd.arg("-h")
                .arg(format!("x-goog-meta-{FINGERPRINT_METADATA_KEY}:{fingerprint}"));
        }
        cmd.arg("cp").arg(src).arg(url);
        run_command_capture(cmd).map(|_| ())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("rm").arg(self.object_url(key)?);
        run_command_capture(cmd).map(|_| ())
    }
}

/// Runs the command and returns its stdout, failing on a non-zero exit
fn run_command_capture(mut cmd: Command) -> Result<String> {
    tracing::debug!("Running {:?}", cmd);
    let out = run_command_output(&mut cmd)?;
    if out.status.success() {
        return Ok(String::from_utf8_lossy(&out.stdout).into_owned());
    }
    Err(command_error(&cmd, command_summary(&out)))
}

fn run_command_output(cmd: &mut Command) -> Result<Output> {
    cmd.output().map_err(|e| Error::Command {
        command: format!("{:?}", cmd),
        summary: format!("failed to start: {e}"),
    })
}

fn command_error(cmd: &Command, summary: String) -> Error {
    Error::Command {
        command: format!("{:?}", cmd),
        summary,
    }
}

fn command_summary(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    if !stdout.is_empty() {
        return stdout;
    }
    format!("status {}", out.status)
}

fn parse_ls_output(bucket: &str, stdout: &str) -> Vec<String> {
    let url_prefix = format!("gs://{bucket}/");
    stdout
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix(url_prefix.as_str()))
        .filter(|key| !key.is_empty() && !key.ends_with('/'))
        .map(str::to_string)
        .collect_vec()
}

/// Extracts the custom `fingerprint` entry of the `Metadata:` block printed by `gsutil stat`
fn parse_stat_output(stdout: &str) -> Result<ObjectMetadata> {
    let mut in_metadata = false;
    let mut metadata_indent = 0;
    for line in stdout.lines() {
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if in_metadata {
            if indent <= metadata_indent {
                in_metadata = false;
            } else if let Some((k, v)) = trimmed.split_once(':') {
                if k.trim() == FINGERPRINT_METADATA_KEY {
                    return Ok(ObjectMetadata {
                        fingerprint: Some(v.parse::<Fingerprint>()?),
                    });
                }
                continue;
            }
        }
        if trimmed == "Metadata:" {
            in_metadata = true;
            metadata_indent = indent;
        }
    }
    Ok(ObjectMetadata::default())
}
