//! Post-write fix for `feed_info.txt`.
//!
//! The archive writer only emits the core tables. When the feed carries
//! metadata, this step appends `feed_info.txt` to the finished archive,
//! leaving every existing entry as it is.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::result::{ZipError, ZipResult};
use zip::{ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::feed::{FEED_INFO_FILE, Feed, encode_feed_info, entry_options};

/// What [`patch`] did to the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// `feed_info.txt` was appended.
    Appended,
    /// The archive already had `feed_info.txt`.
    AlreadyPresent,
    /// The feed has no metadata to add.
    NoFeedInfo,
}

/// Appends `feed_info.txt` to the archive at `archive_path` if the feed has
/// metadata and the archive lacks the table.
#[tracing::instrument(skip(feed, archive_path), fields(path = %archive_path.display()))]
pub fn patch(feed: &Feed, archive_path: &Path) -> Result<PatchOutcome> {
    let patch_err = |message: String| Error::Patch {
        path: archive_path.to_path_buf(),
        message,
    };

    let Some(info) = feed.feed_info() else {
        debug!("Feed has no feed_info; nothing to patch");
        return Ok(PatchOutcome::NoFeedInfo);
    };

    if contains_entry(archive_path, FEED_INFO_FILE).map_err(|e| patch_err(e.to_string()))? {
        debug!("Archive already contains {FEED_INFO_FILE}");
        return Ok(PatchOutcome::AlreadyPresent);
    }

    let table = encode_feed_info(info).map_err(|e| patch_err(e.to_string()))?;

    append_staged(archive_path, |zip| {
        zip.start_file(FEED_INFO_FILE, entry_options())?;
        zip.write_all(&table)?;
        Ok(())
    })
    .map_err(|e| patch_err(e.to_string()))?;

    info!("Added {FEED_INFO_FILE} to archive");
    Ok(PatchOutcome::Appended)
}

fn contains_entry(archive_path: &Path, name: &str) -> ZipResult<bool> {
    let archive = ZipArchive::new(File::open(archive_path)?)?;
    let found = archive.file_names().any(|n| n == name);
    Ok(found)
}

/// `<archive>.partial`, in the archive's directory.
fn staging_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Appends entries to a copy of the archive and renames the copy over the
/// original once the copy is complete. On failure the original is untouched
/// and the copy is removed.
fn append_staged<F>(archive_path: &Path, add_entries: F) -> ZipResult<()>
where
    F: FnOnce(&mut ZipWriter<File>) -> ZipResult<()>,
{
    let staging = staging_path(archive_path);
    let result = fs::copy(archive_path, &staging)
        .map_err(ZipError::from)
        .and_then(|_| {
            let file = OpenOptions::new().read(true).write(true).open(&staging)?;
            let mut zip = ZipWriter::new_append(file)?;
            add_entries(&mut zip)?;
            zip.finish()?;
            Ok(())
        })
        .and_then(|()| fs::rename(&staging, archive_path).map_err(ZipError::from));

    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}
