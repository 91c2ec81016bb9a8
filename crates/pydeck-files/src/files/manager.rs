//! Event-emitting file manager.
//!
//! Thin facade over a [`RemoteFileSystem`]: every public operation catches
//! the command layer's error and converts it into a uniform
//! [`FileManagerEvent::OperationFailed`] notification instead of letting it
//! escape to the consumer.  Results travel the same channel, so a front-end
//! only ever deals with events.

use crate::files::remote::RemoteFileSystem;
use crate::files::sync::{sync_with_device, SyncOptions, SyncReport};
use crate::files::types::FileManagerEvent;
use std::path::Path;
use tokio::sync::mpsc;

/// Buffered capacity of the event channel handed out by [`FileManager::new`].
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// File manager facade over a board filesystem.
pub struct FileManager<R: RemoteFileSystem> {
    remote: R,
    events: mpsc::Sender<FileManagerEvent>,
}

impl<R: RemoteFileSystem> FileManager<R> {
    /// Create a manager and the receiving end of its event channel.
    pub fn new(remote: R) -> (Self, mpsc::Receiver<FileManagerEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { remote, events }, rx)
    }

    /// Create a manager emitting into an existing channel.
    pub fn with_sender(remote: R, events: mpsc::Sender<FileManagerEvent>) -> Self {
        Self { remote, events }
    }

    /// Direct access to the underlying filesystem, for operations that are
    /// not event-driven (introspection, clock).
    pub fn remote_mut(&mut self) -> &mut R {
        &mut self.remote
    }

    async fn emit(&self, event: FileManagerEvent) {
        let _ = self.events.send(event).await;
    }

    async fn fail(&self, operation: &str, message: String) {
        log::warn!("{} failed: {}", operation, message);
        self.emit(FileManagerEvent::OperationFailed {
            operation: operation.to_string(),
            message,
        })
        .await;
    }

    // ── Listing / navigation ──────────────────────────────────────

    pub async fn lls(&mut self, dir: &str, show_hidden: bool) {
        match self.remote.lls(dir, false, show_hidden).await {
            Ok(entries) => {
                self.emit(FileManagerEvent::Listing {
                    directory: dir.to_string(),
                    entries,
                })
                .await
            }
            Err(e) => self.fail("lls", e).await,
        }
    }

    pub async fn cd(&mut self, dir: &str) {
        match self.remote.cd(dir).await {
            Ok(()) => {
                self.emit(FileManagerEvent::CurrentDirectory {
                    directory: dir.to_string(),
                })
                .await
            }
            Err(e) => self.fail("cd", e).await,
        }
    }

    pub async fn pwd(&mut self) {
        match self.remote.pwd().await {
            Ok(directory) => {
                self.emit(FileManagerEvent::CurrentDirectory { directory })
                    .await
            }
            Err(e) => self.fail("pwd", e).await,
        }
    }

    // ── Transfer ──────────────────────────────────────────────────

    pub async fn get(&mut self, device_file: &str, local_file: &Path) {
        let data = match self.remote.get_bytes(device_file).await {
            Ok(data) => data,
            Err(e) => return self.fail("get", e).await,
        };
        if let Err(e) = tokio::fs::write(local_file, &data).await {
            return self
                .fail(
                    "get",
                    format!("cannot write '{}': {}", local_file.display(), e),
                )
                .await;
        }
        self.emit(FileManagerEvent::GetDone {
            device_file: device_file.to_string(),
            local_file: local_file.display().to_string(),
        })
        .await;
    }

    pub async fn put(&mut self, local_file: &Path, device_file: &str) {
        // Local read errors surface before any board interaction.
        let data = match tokio::fs::read(local_file).await {
            Ok(data) => data,
            Err(e) => {
                return self
                    .fail(
                        "put",
                        format!("cannot read '{}': {}", local_file.display(), e),
                    )
                    .await
            }
        };
        match self.remote.put_bytes(&data, device_file).await {
            Ok(()) => {
                self.emit(FileManagerEvent::PutDone {
                    local_file: local_file.display().to_string(),
                    device_file: device_file.to_string(),
                })
                .await
            }
            Err(e) => self.fail("put", e).await,
        }
    }

    // ── Create / remove ───────────────────────────────────────────

    pub async fn delete(&mut self, file: &str) {
        match self.remote.rm(file).await {
            Ok(()) => {
                self.emit(FileManagerEvent::Removed {
                    name: file.to_string(),
                })
                .await
            }
            Err(e) => self.fail("delete", e).await,
        }
    }

    pub async fn mkdir(&mut self, dir: &str) {
        match self.remote.mkdir(dir).await {
            Ok(()) => {
                self.emit(FileManagerEvent::DirCreated {
                    name: dir.to_string(),
                })
                .await
            }
            Err(e) => self.fail("mkdir", e).await,
        }
    }

    pub async fn rmdir(&mut self, dir: &str) {
        match self.remote.rmdir(dir).await {
            Ok(()) => {
                self.emit(FileManagerEvent::DirRemoved {
                    name: dir.to_string(),
                })
                .await
            }
            Err(e) => self.fail("rmdir", e).await,
        }
    }

    // ── Info / sync ───────────────────────────────────────────────

    pub async fn fs_info(&mut self) {
        match self.remote.fs_info().await {
            Ok(mounts) => self.emit(FileManagerEvent::FsInfoResult { mounts }).await,
            Err(e) => self.fail("fsinfo", e).await,
        }
    }

    /// Mirror-capable directory synchronisation; progress, collected errors
    /// and the terminal done notification all arrive on the event channel.
    pub async fn rsync(
        &mut self,
        local_dir: &Path,
        device_dir: &str,
        options: &SyncOptions,
    ) -> SyncReport {
        sync_with_device(&mut self.remote, local_dir, device_dir, options, &self.events).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::memory::MemoryFileSystem;
    use crate::files::types::FileManagerEvent as Event;

    fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_lls_emits_listing() {
        let mut fs = MemoryFileSystem::new();
        fs.insert_file("/main.py", b"pass", 10);
        let (mut manager, mut rx) = FileManager::new(fs);

        manager.lls("/", false).await;
        let events = drain(&mut rx);
        assert!(matches!(
            &events[0],
            Event::Listing { directory, entries }
                if directory == "/" && entries.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_lls_failure_becomes_notification() {
        let (mut manager, mut rx) = FileManager::new(MemoryFileSystem::new());
        manager.lls("/missing", false).await;
        let events = drain(&mut rx);
        assert!(matches!(
            &events[0],
            Event::OperationFailed { operation, .. } if operation == "lls"
        ));
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("local.py");
        std::fs::write(&src, "print('hi')").unwrap();

        let (mut manager, mut rx) = FileManager::new(MemoryFileSystem::new());
        manager.put(&src, "/main.py").await;
        assert!(matches!(
            &drain(&mut rx)[0],
            Event::PutDone { device_file, .. } if device_file == "/main.py"
        ));

        let dest = dir.path().join("back.py");
        manager.get("/main.py", &dest).await;
        assert!(matches!(&drain(&mut rx)[0], Event::GetDone { .. }));
        assert_eq!(std::fs::read(&dest).unwrap(), b"print('hi')");
    }

    #[tokio::test]
    async fn test_put_missing_local_file_reports_before_device() {
        let (mut manager, mut rx) = FileManager::new(MemoryFileSystem::new());
        manager
            .put(Path::new("/no/such/file.py"), "/main.py")
            .await;

        let events = drain(&mut rx);
        assert!(matches!(
            &events[0],
            Event::OperationFailed { operation, .. } if operation == "put"
        ));
        // No board interaction happened.
        assert_eq!(manager.remote_mut().put_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_and_mkdir_events() {
        let mut fs = MemoryFileSystem::new();
        fs.insert_file("/old.py", b"", 0);
        let (mut manager, mut rx) = FileManager::new(fs);

        manager.delete("/old.py").await;
        manager.mkdir("/lib").await;
        manager.rmdir("/lib").await;

        let events = drain(&mut rx);
        assert!(matches!(&events[0], Event::Removed { name } if name == "/old.py"));
        assert!(matches!(&events[1], Event::DirCreated { name } if name == "/lib"));
        assert!(matches!(&events[2], Event::DirRemoved { name } if name == "/lib"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_notification() {
        let (mut manager, mut rx) = FileManager::new(MemoryFileSystem::new());
        manager.delete("/missing.py").await;
        assert!(matches!(
            &drain(&mut rx)[0],
            Event::OperationFailed { operation, .. } if operation == "delete"
        ));
    }

    #[tokio::test]
    async fn test_fs_info_event() {
        let (mut manager, mut rx) = FileManager::new(MemoryFileSystem::new());
        manager.fs_info().await;
        assert!(matches!(
            &drain(&mut rx)[0],
            Event::FsInfoResult { mounts } if mounts.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_rsync_through_manager() {
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join("a.py"), "pass").unwrap();

        let mut fs = MemoryFileSystem::new();
        fs.insert_dir("/app");
        let (mut manager, mut rx) = FileManager::new(fs);

        let report = manager
            .rsync(
                local.path(),
                "/app",
                &SyncOptions {
                    mirror: true,
                    show_hidden: false,
                },
            )
            .await;
        assert_eq!(report.copied, 1);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, Event::SyncDone { .. })));
        assert!(manager.remote_mut().contains("/app/a.py"));
    }

    #[tokio::test]
    async fn test_cd_and_pwd_events() {
        let mut fs = MemoryFileSystem::new();
        fs.insert_dir("/lib");
        let (mut manager, mut rx) = FileManager::new(fs);

        manager.cd("/lib").await;
        manager.pwd().await;
        let events = drain(&mut rx);
        assert!(matches!(
            &events[0],
            Event::CurrentDirectory { directory } if directory == "/lib"
        ));
        assert!(matches!(
            &events[1],
            Event::CurrentDirectory { directory } if directory == "/lib"
        ));
    }
}
