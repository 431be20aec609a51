use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::MountTableError;

/// Exclusive advisory lock on `<table>.lock`.
///
/// Held for the duration of a load-mutate-save cycle. Released on drop.
/// Acquisition blocks, so async callers should go through
/// `spawn_blocking`.
#[derive(Debug)]
pub struct TableLock {
    file: File,
    path: PathBuf,
}

impl TableLock {
    pub fn lock_path(table_path: &Path) -> PathBuf {
        let mut name = OsString::from(table_path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn acquire(table_path: &Path) -> Result<Self, MountTableError> {
        let path = Self::lock_path(table_path);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        lock_exclusive(&file)?;
        tracing::trace!("acquired table lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TableLock {
    fn drop(&mut self) {
        if let Err(e) = unlock(&self.file) {
            tracing::warn!("failed to release table lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(unix)]
fn unlock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_appends_suffix() {
        let path = TableLock::lock_path(Path::new("/var/sdm/mounts.tab"));
        assert_eq!(path, PathBuf::from("/var/sdm/mounts.tab.lock"));
    }

    #[test]
    fn test_lock_is_reacquirable_after_drop() {
        let dir = TempDir::new().unwrap();
        let table = dir.path().join("mounts.tab");

        let lock = TableLock::acquire(&table).unwrap();
        assert!(lock.path().exists());
        drop(lock);

        TableLock::acquire(&table).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_excludes_second_holder() {
        let dir = TempDir::new().unwrap();
        let table = dir.path().join("mounts.tab");

        let first = TableLock::acquire(&table).unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let handle = {
            let table = table.clone();
            let acquired = acquired.clone();
            std::thread::spawn(move || {
                let _second = TableLock::acquire(&table).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(first);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
