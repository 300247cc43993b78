// Advisory writer lock for the state directory

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::warn;

use crate::config::STATE_DIR;
use crate::error::{EngineError, Result};

/// RAII advisory lock guarding the single writer. A lock file whose mtime
/// is older than the grace period is presumed stale (crashed writer) and
/// broken with a warning.
pub struct IndexLock {
    file: File,
    path: PathBuf,
}

impl IndexLock {
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(600);

    pub fn acquire(repo_root: &Path, grace: Duration) -> Result<Self> {
        let dir = repo_root.join(STATE_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("index.lock");

        match Self::try_acquire(&path) {
            Ok(lock) => Ok(lock),
            Err(_) => {
                let age = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| SystemTime::now().duration_since(t).ok());
                if age.map(|a| a > grace).unwrap_or(false) {
                    warn!(
                        "Breaking stale index lock at {} (age {:?} > grace {:?})",
                        path.display(),
                        age.unwrap(),
                        grace
                    );
                    let _ = std::fs::remove_file(&path);
                    return Self::try_acquire(&path);
                }
                Err(EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    format!(
                        "another indexer holds the lock at {}; retry later",
                        path.display()
                    ),
                )))
            }
        }
    }

    fn try_acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive().map_err(EngineError::Io)?;
        // Record holder and refresh mtime for staleness checks.
        let _ = file.set_len(0);
        use std::io::Write;
        let mut f = &file;
        let _ = writeln!(f, "{}", std::process::id());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = IndexLock::acquire(dir.path(), IndexLock::DEFAULT_GRACE).unwrap();
            assert!(dir.path().join(STATE_DIR).join("index.lock").exists());
        }
        // Released on drop; a second acquire succeeds.
        let _lock = IndexLock::acquire(dir.path(), IndexLock::DEFAULT_GRACE).unwrap();
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let _held = IndexLock::acquire(dir.path(), IndexLock::DEFAULT_GRACE).unwrap();
        let second = IndexLock::acquire(dir.path(), IndexLock::DEFAULT_GRACE);
        assert!(second.is_err());
    }
}
