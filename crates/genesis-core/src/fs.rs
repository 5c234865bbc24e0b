//! Filesystem helpers.

use genesis_types::{GenesisError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// The working directory is process-global; the engine is single-threaded
// but tests are not, so guards serialize on this lock.
static CWD_LOCK: Mutex<()> = Mutex::new(());

/// Guard that changes the working directory and restores it on drop.
///
/// Merges run with a transient working directory; every exit path must
/// restore the original, so the change is tied to this guard's lifetime.
pub struct WorkdirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl WorkdirGuard {
    /// Change into `dir`, restoring the previous directory on drop.
    pub fn enter(dir: impl AsRef<Path>) -> Result<Self> {
        let lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let original = std::env::current_dir()?;
        std::env::set_current_dir(dir.as_ref()).map_err(|e| {
            GenesisError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot enter {}: {}", dir.as_ref().display(), e),
            ))
        })?;
        Ok(Self {
            original,
            _lock: lock,
        })
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// Write `content` to `path`, creating parent directories and replacing
/// any existing file atomically (write to a sibling, then rename).
pub fn write_file(path: impl AsRef<Path>, content: &str) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp~");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a file to a string with the path included in any error.
pub fn read_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| {
        GenesisError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read {}: {}", path.display(), e),
        ))
    })
}
