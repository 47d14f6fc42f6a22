use crate::backup::archive::{ArchiveEntry, ArchiveEntryIterable};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithFnName, WithMsg};

use bon::Builder;
use derive_more::{Display, From};
use dyn_iter::{DynIter, IntoDynIterator};
use function_name::named;
use getset::Getters;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize};
use walkdir::{DirEntry, WalkDir};

use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::result;

/// Walks `src_dir` in file name order and keeps the files matching `globset`
#[derive(Clone, Debug, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct WalkdirAndGlobsetSource {
    #[builder(into)]
    src_dir: PathBuf,
    #[builder(default = default_globset(), into)]
    globset: Vec<CustomDeserializedGlob>,
}

pub fn default_globset() -> Vec<CustomDeserializedGlob> {
    vec![CustomDeserializedGlob::default()]
}

/// Glob matched against paths relative to the walked directory, `*` never crosses `/`
#[derive(Clone, Debug, From, Display, Serialize, PartialEq, Eq, Getters)]
#[serde(transparent)]
#[getset(get = "pub")]
pub struct CustomDeserializedGlob {
    glob: Glob,
}

impl CustomDeserializedGlob {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()?
            .into())
    }
}

impl Default for CustomDeserializedGlob {
    fn default() -> Self {
        GlobBuilder::new("**/*")
            .literal_separator(true)
            .build()
            .unwrap()
            .into()
    }
}

struct CustomGlobVisitor;

impl Visitor<'_> for CustomGlobVisitor {
    type Value = CustomDeserializedGlob;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a glob pattern")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        CustomDeserializedGlob::new(v).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for CustomDeserializedGlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(CustomGlobVisitor)
    }
}

impl ArchiveEntryIterable for WalkdirAndGlobsetSource {
    #[named]
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>> {
        if !self.src_dir.is_dir() {
            tracing::error!(
                "Source directory does not exist or is not a directory: {:?}",
                self.src_dir
            );
            return Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{:?} is not a directory", self.src_dir),
            )));
        }

        tracing::info!(
            "Starting directory scan: {:?} with {} glob patterns",
            self.src_dir,
            self.globset.len()
        );

        let mut builder = GlobSetBuilder::new();
        if self.globset.is_empty() {
            builder.add(CustomDeserializedGlob::default().glob);
        } else {
            for g in &self.globset {
                builder.add(g.glob.clone());
            }
        }
        let globset = builder.build()?;
        let src_dir = self.src_dir.clone();

        let entries = WalkDir::new(&self.src_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |res| match res {
                Ok(de) => process_dir_entry(de, &src_dir, &globset),
                Err(e) => Some(Err(e.into())),
            })
            .map(move |res| res.with_fn_name(function_path!()));

        Ok(entries.into_dyn_iter())
    }
}

fn process_dir_entry<P: AsRef<Path>>(
    de: DirEntry,
    base_src_dir: P,
    globset: &GlobSet,
) -> Option<Result<ArchiveEntry>> {
    if de.depth() == 0 {
        return None;
    }
    if !de.file_type().is_file() && !de.file_type().is_dir() {
        tracing::trace!("Skipping {:?} not a file or directory", de.path());
        return None;
    }

    let p = de.into_path();
    let res = match p.strip_prefix(base_src_dir.as_ref()) {
        Ok(relative) if globset.is_match(relative) => Ok(relative.to_path_buf()),
        Ok(_) => {
            tracing::trace!("Skipping {:?}, glob not match", p);
            return None;
        }
        Err(e) => Err(Error::from(e).with_msg(format!(
            "Stripping {:?} from {:?} failed",
            base_src_dir.as_ref(),
            p
        ))),
    };

    Some(res.map(|dst| {
        tracing::trace!("Including {:?} -> {:?}", p, dst);
        ArchiveEntry::new(p, dst)
    }))
}
