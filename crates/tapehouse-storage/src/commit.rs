//! Atomic temp → final commit shared by data files and manifests.

use std::path::Path;

use crate::error::{Error, Result};

/// Rename `tmp` over `final_path`, then optionally fsync the parent directory
/// so the rename itself survives a crash.
///
/// The caller must already have synced and closed `tmp`. A failed directory
/// sync is logged but does not undo the commit.
pub(crate) fn commit_rename(tmp: &Path, final_path: &Path, sync_directory: bool) -> Result<()> {
    std::fs::rename(tmp, final_path).map_err(|source| Error::Commit {
        from: tmp.to_path_buf(),
        to: final_path.to_path_buf(),
        source,
    })?;

    if sync_directory {
        if let Some(parent) = final_path.parent() {
            if let Err(e) = sync_dir(parent) {
                tracing::warn!(dir = %parent.display(), error = %e, "Directory fsync failed after commit");
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
