pub mod walkdir_globset;

use crate::backup::compress::{CompressorBuilder, CompressorConfig};
use crate::backup::fingerprint::Fingerprint;
use crate::backup::finish::Finish;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use dyn_iter::DynIter;
use getset::Getters;
use std::fmt::Debug;
use std::io::{BufReader, BufWriter, IntoInnerError};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A single file to be written into the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path on the local filesystem
    pub src: PathBuf,
    /// Relative path inside the archive
    pub dst: PathBuf,
}

impl ArchiveEntry {
    pub fn new<A: Into<PathBuf>, B: Into<PathBuf>>(src: A, dst: B) -> ArchiveEntry {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// Something that can enumerate the files of a backup target.
///
/// Implementations must yield entries in a stable order so that an
/// unchanged target produces a byte-identical archive.
pub trait ArchiveEntryIterable {
    fn archive_entry_iterator<'a>(&self) -> Result<DynIter<'a, Result<ArchiveEntry>>>;
}

/// Archive blob of one run, deleted from the working directory when dropped
#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct BuiltArchive {
    file: NamedTempFile,
    fingerprint: Fingerprint,
    entry_count: usize,
}

impl BuiltArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Writes every entry of `source` into a tar blob in `work_dir` and fingerprints it.
///
/// Any failure is reported as an archive error naming `target`.
pub fn create_archive<S: ArchiveEntryIterable>(
    target: &Path,
    source: &S,
    compressor: &CompressorConfig,
    work_dir: Option<&Path>,
) -> Result<BuiltArchive> {
    write_archive(source, compressor, work_dir).map_err(|e| Error::archive(target, e))
}

fn write_archive<S: ArchiveEntryIterable>(
    source: &S,
    compressor: &CompressorConfig,
    work_dir: Option<&Path>,
) -> Result<BuiltArchive> {
    let mut temp_builder = tempfile::Builder::new();
    temp_builder.prefix("backup-").suffix(".tar");
    let file = match work_dir {
        Some(dir) => temp_builder.tempfile_in(dir)?,
        None => temp_builder.tempfile()?,
    };

    let writer = compressor
        .build_compressor(BufWriter::new(file.as_file().try_clone()?))
        .map(BufWriter::new)?;
    let mut writer = tar::Builder::new(writer);
    writer.follow_symlinks(true);

    let mut entry_count = 0;
    for entry in source.archive_entry_iterator()? {
        let entry = entry?;
        writer.append_path_with_name(&entry.src, &entry.dst)?;
        entry_count += 1;
    }

    writer
        .into_inner()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .sync_all()?;

    let fingerprint = Fingerprint::of_reader(BufReader::new(file.reopen()?))?;
    tracing::info!(
        "Archived {} entries into {:?}, fingerprint {}",
        entry_count,
        file.path(),
        fingerprint
    );

    Ok(BuiltArchive {
        file,
        fingerprint,
        entry_count,
    })
}
