//! Local filesystem implementation of FileService
//!
//! This is the service that runs inside the broker-spawned, elevated process.
//! It wraps `tokio::fs` and collapses ordinary filesystem outcomes into status
//! values, so only faults of the service itself travel back as errors.

use crate::lifecycle::{LifecycleState, ServiceLifecycle};
use elevate_core_interface::{FileService, FileServiceError, Result};
use parking_lot::Mutex;
use std::path::Path;
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info};

/// Filesystem-backed file service
///
/// # Example
///
/// ```rust,no_run
/// use elevate_core_interface::FileService;
/// use elevate_service::LocalFileService;
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let service = LocalFileService::new("com.example.dronestuff:file_service");
///     let names = service.list_files(Path::new("/sdcard/Android/data")).await?;
///     println!("{} entries", names.len());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct LocalFileService {
    lifecycle: Mutex<ServiceLifecycle>,
    destroyed: watch::Sender<bool>,
}

impl LocalFileService {
    /// Create a service for the process named `service_id`
    pub fn new(service_id: &str) -> Self {
        let (destroyed, _) = watch::channel(false);
        Self {
            lifecycle: Mutex::new(ServiceLifecycle::new(service_id)),
            destroyed,
        }
    }

    /// Mark the service as handed to a client
    pub fn mark_serving(&self) {
        if let Some(event) = self.lifecycle.lock().on_serving() {
            debug!(service = %event.service_id, "File service serving");
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.lock().state()
    }

    pub fn calls_served(&self) -> u64 {
        self.lifecycle.lock().calls_served()
    }

    /// Watch for the destroy signal
    ///
    /// The process host awaits this and exits once it fires.
    pub fn destroy_watch(&self) -> DestroyWatch {
        DestroyWatch(self.destroyed.subscribe())
    }

    fn enter(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.accepts_calls() {
            return Err(FileServiceError::Destroyed);
        }
        lifecycle.call_served();
        Ok(())
    }
}

#[async_trait::async_trait]
impl FileService for LocalFileService {
    async fn list_files(&self, path: &Path) -> Result<Vec<String>> {
        self.enter()?;

        match fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Ok(Vec::new()),
        }

        let mut dir = match fs::read_dir(path).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Directory not readable");
                return Ok(Vec::new());
            }
        };

        let mut names = Vec::new();
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => names.push(entry.file_name().to_string_lossy().into_owned()),
                Ok(None) => break,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Directory listing aborted");
                    return Ok(Vec::new());
                }
            }
        }
        names.sort();

        Ok(names)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.enter()?;

        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Ok(Vec::new()),
        }

        Ok(fs::read(path).await?)
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<bool> {
        self.enter()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            // A failure here resurfaces as a failed write
            let _ = fs::create_dir_all(parent).await;
        }

        match fs::write(path, bytes).await {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Write failed");
                Ok(false)
            }
        }
    }

    async fn file_size(&self, path: &Path) -> Result<i64> {
        self.enter()?;

        Ok(match fs::metadata(path).await {
            Ok(meta) => i64::try_from(meta.len()).unwrap_or(i64::MAX),
            Err(_) => -1,
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.enter()?;

        Ok(fs::metadata(path).await.is_ok())
    }

    async fn delete_file(&self, path: &Path) -> Result<bool> {
        self.enter()?;

        let meta = match fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(_) => return Ok(false),
        };

        let removed = if meta.is_dir() {
            fs::remove_dir(path).await
        } else {
            fs::remove_file(path).await
        };

        match removed {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Delete failed");
                Ok(false)
            }
        }
    }

    fn destroy(&self) {
        let mut lifecycle = self.lifecycle.lock();
        let calls = lifecycle.calls_served();
        if let Some(event) = lifecycle.on_destroyed() {
            info!(
                service = %event.service_id,
                from = event.from.as_str(),
                elapsed = ?event.elapsed,
                calls,
                "File service destroyed"
            );
        }
        drop(lifecycle);
        self.destroyed.send_replace(true);
    }
}

/// Receiver side of the destroy signal
#[derive(Debug, Clone)]
pub struct DestroyWatch(watch::Receiver<bool>);

impl DestroyWatch {
    pub fn is_destroyed(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once the service has been destroyed or dropped
    pub async fn wait(mut self) {
        let _ = self.0.wait_for(|destroyed| *destroyed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn service() -> LocalFileService {
        LocalFileService::new("test:file_service")
    }

    #[tokio::test]
    async fn test_list_files() {
        let svc = service();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.kmz"), b"b").unwrap();
        std::fs::write(dir.path().join("a.kmz"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let names = svc.list_files(dir.path()).await.unwrap();
        assert_eq!(names, vec!["a.kmz", "b.kmz", "sub"]);
    }

    #[tokio::test]
    async fn test_list_files_on_missing_or_regular_file_is_empty() {
        let svc = service();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(svc.list_files(&dir.path().join("nope")).await.unwrap().is_empty());
        assert!(svc.list_files(&file).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_file_on_missing_or_directory_is_empty() {
        let svc = service();
        let dir = tempfile::tempdir().unwrap();

        assert!(svc.read_file(&dir.path().join("nope")).await.unwrap().is_empty());
        assert!(svc.read_file(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let svc = service();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waypoint").join("ABCD").join("mission.kmz");

        assert!(svc.write_file(&path, b"PK\x03\x04").await.unwrap());
        assert_eq!(svc.read_file(&path).await.unwrap(), b"PK\x03\x04");
    }

    #[tokio::test]
    async fn test_write_over_directory_fails_softly() {
        let svc = service();
        let dir = tempfile::tempdir().unwrap();

        assert!(!svc.write_file(dir.path(), b"x").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_size_and_exists_agree() {
        let svc = service();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");

        assert_eq!(svc.file_size(&path).await.unwrap(), -1);
        assert!(!svc.exists(&path).await.unwrap());

        std::fs::write(&path, b"AB").unwrap();
        assert_eq!(svc.file_size(&path).await.unwrap(), 2);
        assert!(svc.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_file() {
        let svc = service();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        std::fs::write(&path, b"AB").unwrap();

        assert!(svc.delete_file(&path).await.unwrap());
        assert!(!svc.exists(&path).await.unwrap());
        // Nothing left to delete
        assert!(!svc.delete_file(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_directory_only_when_empty() {
        let svc = service();
        let dir = tempfile::tempdir().unwrap();
        let full = dir.path().join("full");
        std::fs::create_dir(&full).unwrap();
        std::fs::write(full.join("f"), b"1").unwrap();
        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty).unwrap();

        assert!(!svc.delete_file(&full).await.unwrap());
        assert!(svc.delete_file(&empty).await.unwrap());
    }

    #[tokio::test]
    async fn test_destroy_refuses_further_calls() {
        let svc = service();
        svc.mark_serving();
        assert_eq!(svc.state(), LifecycleState::Serving);

        svc.destroy();
        assert_eq!(svc.state(), LifecycleState::Destroyed);

        let err = svc.exists(Path::new("/")).await.unwrap_err();
        assert!(matches!(err, FileServiceError::Destroyed));
    }

    #[tokio::test]
    async fn test_destroy_watch_fires() {
        let svc = service();
        let watch = svc.destroy_watch();
        assert!(!watch.is_destroyed());

        svc.destroy();

        tokio::time::timeout(Duration::from_secs(1), watch.clone().wait())
            .await
            .expect("destroy signal not observed");
        assert!(watch.is_destroyed());
    }

    #[tokio::test]
    async fn test_calls_are_counted() {
        let svc = service();
        let _ = svc.exists(Path::new("/")).await;
        let _ = svc.file_size(Path::new("/")).await;
        assert_eq!(svc.calls_served(), 2);
    }
}
