//! Advisory locks serializing writers of the settings file and of config
//! layers across processes.
//!
//! The lock is taken on a sibling `<file>.lock`, never on the guarded file
//! itself: the guarded file is replaced by rename on every write, which
//! would orphan a lock held on its old inode.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Exclusive lock guarding one file. Released on drop.
pub struct FileLock {
    _file: File,
}

impl FileLock {
    /// Block until the lock guarding `target` is held.
    pub fn guard(target: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path_for(target))?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

/// `<path>.lock`
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}
