//! Build lock - keeps two processes from building the same recipe root.
//!
//! The lock is an `fs2` exclusive lock on `<root>.lock`, held for as long as
//! the holding process lives. The file itself stays on disk; every process
//! must lock the same inode.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::error::BuildError;
use crate::Recipe;

/// Lock file guarding `root`: a sibling named `<root>.lock`.
pub fn lock_path(root: &Path) -> PathBuf {
    let mut name = root.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    root.with_file_name(name)
}

/// Take the exclusive lock for a recipe root.
/// The returned guard releases the lock when dropped.
pub fn acquire(recipe: &Recipe, root: &Path) -> Result<BuildLock, BuildError> {
    let path = lock_path(root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| BuildError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|source| BuildError::Io {
            path: path.clone(),
            source,
        })?;

    if file.try_lock_exclusive().is_err() {
        return Err(BuildError::Locked {
            name: recipe.name.clone(),
            version: recipe.version.clone(),
            lock: path,
        });
    }

    Ok(BuildLock { file, path })
}

/// RAII guard for a build lock - releases the lock when dropped
#[derive(Debug)]
pub struct BuildLock {
    file: File,
    path: PathBuf,
}

impl BuildLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_is_sibling() {
        assert_eq!(
            lock_path(Path::new("/b/llvm-2.8")),
            PathBuf::from("/b/llvm-2.8.lock")
        );
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("x-1");
        let recipe = Recipe::new("x", "1");

        {
            let lock = acquire(&recipe, &root).unwrap();
            assert!(lock.path().exists());
        }
        assert!(acquire(&recipe, &root).is_ok());
    }

    #[test]
    fn test_concurrent_lock_blocked() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("x-1");
        let recipe = Recipe::new("x", "1");

        let _first = acquire(&recipe, &root).unwrap();
        let second = acquire(&recipe, &root);
        assert!(matches!(second, Err(BuildError::Locked { .. })));
    }

    #[test]
    fn test_old_lock_still_held_is_not_taken_over() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("llvm-2.8");
        let recipe = Recipe::new("llvm", "2.8");

        let first = acquire(&recipe, &root).unwrap();
        let three_hours_ago = SystemTime::now() - Duration::from_secs(3 * 60 * 60);
        File::options()
            .write(true)
            .open(first.path())
            .unwrap()
            .set_modified(three_hours_ago)
            .unwrap();

        let second = acquire(&recipe, &root);
        assert!(matches!(second, Err(BuildError::Locked { .. })));
        assert!(first.path().exists());
    }

    #[test]
    fn test_leftover_lock_file_does_not_block() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("x-1");
        std::fs::write(lock_path(&root), b"").unwrap();

        assert!(acquire(&Recipe::new("x", "1"), &root).is_ok());
    }
}
