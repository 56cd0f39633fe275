use std::ffi::{CStr, OsStr};
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use tracing::debug;

use crate::dentry_stress::SLOTS;
use crate::error::{HarnessError, Result};

fn slot_path(base: &Path, name: &CStr) -> std::path::PathBuf {
    base.join(OsStr::from_bytes(name.to_bytes()))
}

/// Unlinks both variants of every slot and removes the directory. A missing
/// directory counts as already clean.
pub fn remove(base: &Path) -> io::Result<()> {
    for slot in SLOTS.iter() {
        let _ = fs::remove_file(slot_path(base, slot.resting));
        let _ = fs::remove_file(slot_path(base, slot.moved));
    }
    match fs::remove_dir(base) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

pub fn recreate(base: &Path) -> Result<()> {
    remove(base).map_err(|source| HarnessError::RemoveBaseDir {
        path: base.to_path_buf(),
        source,
    })?;
    DirBuilder::new()
        .mode(0o755)
        .create(base)
        .map_err(|source| HarnessError::CreateBaseDir {
            path: base.to_path_buf(),
            source,
        })?;
    debug!("Created base directory {}", base.display());
    Ok(())
}
