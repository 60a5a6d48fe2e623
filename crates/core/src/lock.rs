//! Exclusive advisory file locks shared across processes.

use crate::{Error, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Lock `path` exclusively, creating it and its parent directory if needed.
///
/// The lock is released when the returned file is dropped. `what` names the
/// lock in error messages.
pub(crate) async fn lock_exclusive(path: &Path, what: &'static str) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(e, parent, format!("create {what} directory")))?;
    }

    // Waiting on another process may block, keep it off the runtime threads
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io(e, &path, format!("open {what}")))?;
        FileExt::lock_exclusive(&file).map_err(|e| Error::io(e, &path, format!("acquire {what}")))?;
        Ok(file)
    })
    .await
    .map_err(|e| Error::io_no_path(std::io::Error::other(e), format!("join {what} task")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_missing_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("x.lock");
        let _file = lock_exclusive(&path, "test lock").await.unwrap();
        assert!(path.is_file());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_holder_waits_for_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.lock");
        let first = lock_exclusive(&path, "test lock").await.unwrap();

        let waiting = tokio::spawn({
            let path = path.clone();
            async move { lock_exclusive(&path, "test lock").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiting.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .unwrap()
            .unwrap();
        assert!(second.is_ok());
    }
}
