//! Mirror-style directory synchronisation.
//!
//! Compares a fresh snapshot of a local directory against a fresh snapshot
//! of a board directory and derives three sets: entries to add, entries to
//! delete (mirror mode only), and entries to update (modification-time
//! gated, strictly-newer source only, which makes re-runs idempotent).  The
//! file-vs-directory decision is taken from the freshly-snapshotted entry on
//! each side, per entry.
//!
//! Non-fatal errors are collected and reported together at the end; a type
//! mismatch between the two sides is a warning and a skip, never fatal.
//! Boards that mount as a mass-storage volume are synchronised with plain
//! local copies through [`sync_mounted`]: same plan computation, no serial
//! protocol.

use crate::files::remote::RemoteFileSystem;
use crate::files::types::{is_hidden_name, FileManagerEvent};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::sync::mpsc;

// ── Options and report ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Delete destination entries absent from the source.
    pub mirror: bool,
    /// Include hidden entries (leading `.`, trailing `~`) on both sides.
    pub show_hidden: bool,
}

impl SyncOptions {
    /// Options from the application configuration.  Device-side hidden
    /// entries follow the device visibility setting; local hidden entries
    /// are filtered with the same flag because one plan drives both sides.
    pub fn from_config(config: &pydeck_core::PydeckConfig) -> Self {
        Self {
            mirror: config.sync.mirror,
            show_hidden: config.sync.show_hidden_device,
        }
    }
}

/// Outcome of one synchronisation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Files actually copied (additions and updates).
    pub copied: usize,
    /// Destination entries removed (mirror mode).
    pub deleted: usize,
    /// Accumulated non-fatal errors and warnings.
    pub errors: Vec<String>,
}

// ── Snapshots ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct SnapshotEntry {
    is_dir: bool,
    mtime: i64,
}

fn snapshot_local(
    dir: &Path,
    show_hidden: bool,
) -> Result<BTreeMap<String, SnapshotEntry>, String> {
    let mut entries = BTreeMap::new();
    let read_dir = std::fs::read_dir(dir)
        .map_err(|e| format!("cannot list '{}': {}", dir.display(), e))?;
    for entry in read_dir {
        let entry = entry.map_err(|e| format!("cannot list '{}': {}", dir.display(), e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !show_hidden && is_hidden_name(&name) {
            continue;
        }
        let metadata = entry
            .metadata()
            .map_err(|e| format!("cannot stat '{}': {}", entry.path().display(), e))?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        entries.insert(
            name,
            SnapshotEntry {
                is_dir: metadata.is_dir(),
                mtime,
            },
        );
    }
    Ok(entries)
}

async fn snapshot_device<R: RemoteFileSystem>(
    remote: &mut R,
    dir: &str,
    show_hidden: bool,
) -> Result<BTreeMap<String, SnapshotEntry>, String> {
    let listing = remote.lls(dir, true, show_hidden).await?;
    Ok(listing
        .into_iter()
        .map(|entry| {
            (
                entry.name.clone(),
                SnapshotEntry {
                    is_dir: entry.is_dir(),
                    mtime: entry.mtime,
                },
            )
        })
        .collect())
}

fn join_device(dir: &str, name: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", trimmed, name)
    }
}

async fn progress(
    events: &mpsc::Sender<FileManagerEvent>,
    depth: usize,
    message: impl Into<String>,
) {
    let _ = events
        .send(FileManagerEvent::SyncProgress {
            depth,
            message: message.into(),
        })
        .await;
}

// ── Device synchronisation ───────────────────────────────────────────────────

/// Synchronise `local_dir` onto `device_dir` over the serial protocol.
pub async fn sync_with_device<R: RemoteFileSystem>(
    remote: &mut R,
    local_dir: &Path,
    device_dir: &str,
    options: &SyncOptions,
    events: &mpsc::Sender<FileManagerEvent>,
) -> SyncReport {
    let mut report = SyncReport::default();
    sync_device_dir(
        remote,
        local_dir.to_path_buf(),
        device_dir.to_string(),
        options,
        events,
        0,
        &mut report,
    )
    .await;

    if !report.errors.is_empty() {
        let _ = events
            .send(FileManagerEvent::SyncErrors {
                messages: report.errors.clone(),
            })
            .await;
    }
    let _ = events
        .send(FileManagerEvent::SyncDone {
            local_dir: local_dir.display().to_string(),
            device_dir: device_dir.to_string(),
        })
        .await;
    log::info!(
        "sync done: {} -> {} ({} copied, {} deleted, {} error(s))",
        local_dir.display(),
        device_dir,
        report.copied,
        report.deleted,
        report.errors.len()
    );
    report
}

fn sync_device_dir<'a, R: RemoteFileSystem>(
    remote: &'a mut R,
    local_dir: PathBuf,
    device_dir: String,
    options: &'a SyncOptions,
    events: &'a mpsc::Sender<FileManagerEvent>,
    depth: usize,
    report: &'a mut SyncReport,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        progress(
            events,
            depth,
            format!("synchronizing {} -> {}", local_dir.display(), device_dir),
        )
        .await;

        let source = match snapshot_local(&local_dir, options.show_hidden) {
            Ok(source) => source,
            Err(e) => {
                report.errors.push(e);
                return;
            }
        };

        // A missing destination directory is created and treated as empty;
        // the whole source then lands in the to-add set.
        let destination = match snapshot_device(remote, &device_dir, options.show_hidden).await {
            Ok(destination) => destination,
            Err(_) => {
                if let Err(e) = remote.mkdir(&device_dir).await {
                    report
                        .errors
                        .push(format!("cannot create '{}': {}", device_dir, e));
                    return;
                }
                progress(events, depth, format!("created directory {}", device_dir)).await;
                BTreeMap::new()
            }
        };

        let to_add: Vec<&String> = source
            .keys()
            .filter(|name| !destination.contains_key(*name))
            .collect();
        let to_delete: Vec<&String> = destination
            .keys()
            .filter(|name| !source.contains_key(*name))
            .collect();
        let to_update: Vec<&String> = source
            .keys()
            .filter(|name| destination.contains_key(*name))
            .collect();

        for name in to_add {
            let src = local_dir.join(name);
            let dest = join_device(&device_dir, name);
            let entry = source[name];
            if entry.is_dir {
                progress(events, depth, format!("adding directory {}", dest)).await;
                if let Err(e) = remote.mkdir(&dest).await {
                    report.errors.push(format!("cannot create '{}': {}", dest, e));
                    continue;
                }
                sync_device_dir(
                    remote,
                    src,
                    dest,
                    options,
                    events,
                    depth + 1,
                    report,
                )
                .await;
            } else {
                progress(events, depth, format!("adding file {}", dest)).await;
                copy_to_device(remote, &src, &dest, report).await;
            }
        }

        if options.mirror {
            for name in to_delete {
                let dest = join_device(&device_dir, name);
                progress(events, depth, format!("removing {}", dest)).await;
                // Best-effort: force swallows board-side errors so one
                // failure does not abort the batch.
                match remote.rmrf(&dest, true, true).await {
                    Ok(_) => report.deleted += 1,
                    Err(e) => report.errors.push(format!("cannot remove '{}': {}", dest, e)),
                }
            }
        }

        for name in to_update {
            let src = local_dir.join(name);
            let dest = join_device(&device_dir, name);
            let src_entry = source[name];
            let dest_entry = destination[name];
            match (src_entry.is_dir, dest_entry.is_dir) {
                (true, true) => {
                    sync_device_dir(
                        remote,
                        src,
                        dest,
                        options,
                        events,
                        depth + 1,
                        report,
                    )
                    .await;
                }
                (false, false) => {
                    if src_entry.mtime > dest_entry.mtime {
                        progress(events, depth, format!("updating file {}", dest)).await;
                        copy_to_device(remote, &src, &dest, report).await;
                    }
                }
                _ => {
                    report.errors.push(format!(
                        "'{}' is a {} locally but a {} on the board, skipped",
                        name,
                        kind_word(src_entry.is_dir),
                        kind_word(dest_entry.is_dir)
                    ));
                }
            }
        }
    })
}

fn kind_word(is_dir: bool) -> &'static str {
    if is_dir {
        "directory"
    } else {
        "file"
    }
}

async fn copy_to_device<R: RemoteFileSystem>(
    remote: &mut R,
    src: &Path,
    dest: &str,
    report: &mut SyncReport,
) {
    let data = match tokio::fs::read(src).await {
        Ok(data) => data,
        Err(e) => {
            report
                .errors
                .push(format!("cannot read '{}': {}", src.display(), e));
            return;
        }
    };
    match remote.put_bytes(&data, dest).await {
        Ok(()) => report.copied += 1,
        Err(e) => report.errors.push(format!("cannot write '{}': {}", dest, e)),
    }
}

// ── Mounted-volume synchronisation ───────────────────────────────────────────

/// Synchronise `local_dir` onto `mount_dir` for boards exposing their
/// filesystem as a mass-storage volume.  Same plan computation as the
/// protocol variant, executed with plain local copies.
pub async fn sync_mounted(
    local_dir: &Path,
    mount_dir: &Path,
    options: &SyncOptions,
    events: &mpsc::Sender<FileManagerEvent>,
) -> SyncReport {
    let mut report = SyncReport::default();
    sync_mounted_dir(
        local_dir.to_path_buf(),
        mount_dir.to_path_buf(),
        options,
        events,
        0,
        &mut report,
    )
    .await;

    if !report.errors.is_empty() {
        let _ = events
            .send(FileManagerEvent::SyncErrors {
                messages: report.errors.clone(),
            })
            .await;
    }
    let _ = events
        .send(FileManagerEvent::SyncDone {
            local_dir: local_dir.display().to_string(),
            device_dir: mount_dir.display().to_string(),
        })
        .await;
    report
}

fn sync_mounted_dir<'a>(
    local_dir: PathBuf,
    mount_dir: PathBuf,
    options: &'a SyncOptions,
    events: &'a mpsc::Sender<FileManagerEvent>,
    depth: usize,
    report: &'a mut SyncReport,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        progress(
            events,
            depth,
            format!(
                "synchronizing {} -> {}",
                local_dir.display(),
                mount_dir.display()
            ),
        )
        .await;

        let source = match snapshot_local(&local_dir, options.show_hidden) {
            Ok(source) => source,
            Err(e) => {
                report.errors.push(e);
                return;
            }
        };

        // Missing destination: one recursive copy covers the whole tree.
        if !mount_dir.exists() {
            copy_tree(&local_dir, &mount_dir, options, report);
            return;
        }

        let destination = match snapshot_local(&mount_dir, options.show_hidden) {
            Ok(destination) => destination,
            Err(e) => {
                report.errors.push(e);
                return;
            }
        };

        for (name, entry) in &source {
            let src = local_dir.join(name);
            let dest = mount_dir.join(name);
            match destination.get(name) {
                None => {
                    progress(events, depth, format!("adding {}", dest.display())).await;
                    if entry.is_dir {
                        copy_tree(&src, &dest, options, report);
                    } else {
                        copy_local_file(&src, &dest, report);
                    }
                }
                Some(dest_entry) => match (entry.is_dir, dest_entry.is_dir) {
                    (true, true) => {
                        sync_mounted_dir(src, dest, options, events, depth + 1, report).await;
                    }
                    (false, false) => {
                        if entry.mtime > dest_entry.mtime {
                            progress(events, depth, format!("updating {}", dest.display())).await;
                            copy_local_file(&src, &dest, report);
                        }
                    }
                    _ => {
                        report.errors.push(format!(
                            "'{}' is a {} locally but a {} on the volume, skipped",
                            name,
                            kind_word(entry.is_dir),
                            kind_word(dest_entry.is_dir)
                        ));
                    }
                },
            }
        }

        if options.mirror {
            for name in destination.keys().filter(|n| !source.contains_key(*n)) {
                let dest = mount_dir.join(name);
                progress(events, depth, format!("removing {}", dest.display())).await;
                // Best-effort, mirroring continues past individual failures.
                let removed = if destination[name].is_dir {
                    std::fs::remove_dir_all(&dest).is_ok()
                } else {
                    std::fs::remove_file(&dest).is_ok()
                };
                if removed {
                    report.deleted += 1;
                }
            }
        }
    })
}

fn copy_tree(src: &Path, dest: &Path, options: &SyncOptions, report: &mut SyncReport) {
    if let Err(e) = std::fs::create_dir_all(dest) {
        report
            .errors
            .push(format!("cannot create '{}': {}", dest.display(), e));
        return;
    }
    let entries = match snapshot_local(src, options.show_hidden) {
        Ok(entries) => entries,
        Err(e) => {
            report.errors.push(e);
            return;
        }
    };
    for (name, entry) in entries {
        let src_child = src.join(&name);
        let dest_child = dest.join(&name);
        if entry.is_dir {
            copy_tree(&src_child, &dest_child, options, report);
        } else {
            copy_local_file(&src_child, &dest_child, report);
        }
    }
}

fn copy_local_file(src: &Path, dest: &Path, report: &mut SyncReport) {
    match std::fs::copy(src, dest) {
        Ok(_) => report.copied += 1,
        Err(e) => report.errors.push(format!(
            "cannot copy '{}' to '{}': {}",
            src.display(),
            dest.display(),
            e
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::memory::MemoryFileSystem;

    fn channel() -> (
        mpsc::Sender<FileManagerEvent>,
        mpsc::Receiver<FileManagerEvent>,
    ) {
        mpsc::channel(1024)
    }

    fn drain(rx: &mut mpsc::Receiver<FileManagerEvent>) -> Vec<FileManagerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_sync_copies_tree_and_is_idempotent() {
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join("a.txt"), "hello").unwrap();
        std::fs::create_dir(local.path().join("sub")).unwrap();
        std::fs::write(local.path().join("sub/b.txt"), "world").unwrap();

        let mut fs = MemoryFileSystem::new();
        fs.insert_dir("/dest");
        let (tx, mut rx) = channel();
        let options = SyncOptions {
            mirror: true,
            show_hidden: false,
        };

        let report = sync_with_device(&mut fs, local.path(), "/dest", &options, &tx).await;
        assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
        assert_eq!(report.copied, 2);
        assert_eq!(fs.read("/dest/a.txt").unwrap(), b"hello");
        assert_eq!(fs.read("/dest/sub/b.txt").unwrap(), b"world");

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, FileManagerEvent::SyncDone { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, FileManagerEvent::SyncProgress { depth: 1, .. })));

        // Second run: nothing is newer, so no file is copied again.
        let report = sync_with_device(&mut fs, local.path(), "/dest", &options, &tx).await;
        assert_eq!(report.copied, 0);
        assert_eq!(fs.put_count(), 2);
    }

    #[tokio::test]
    async fn test_sync_empty_local_onto_missing_device_dir() {
        let local = tempfile::tempdir().unwrap();
        let mut fs = MemoryFileSystem::new();
        let (tx, _rx) = channel();
        let options = SyncOptions {
            mirror: true,
            show_hidden: false,
        };

        let report = sync_with_device(&mut fs, local.path(), "/dest", &options, &tx).await;
        assert!(report.errors.is_empty());
        assert!(fs.contains("/dest"));
        assert_eq!(fs.ls("/dest").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_mirror_removes_stale_entries() {
        let local = tempfile::tempdir().unwrap();
        let mut fs = MemoryFileSystem::new();
        fs.insert_dir("/dest");
        fs.insert_file("/dest/stale.txt", b"old", 1);
        let (tx, _rx) = channel();

        let options = SyncOptions {
            mirror: false,
            show_hidden: false,
        };
        sync_with_device(&mut fs, local.path(), "/dest", &options, &tx).await;
        assert!(fs.contains("/dest/stale.txt"));

        let options = SyncOptions {
            mirror: true,
            show_hidden: false,
        };
        let report = sync_with_device(&mut fs, local.path(), "/dest", &options, &tx).await;
        assert_eq!(report.deleted, 1);
        assert!(!fs.contains("/dest/stale.txt"));
    }

    #[tokio::test]
    async fn test_update_only_when_source_strictly_newer() {
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join("f.txt"), "new content").unwrap();

        let mut fs = MemoryFileSystem::new();
        fs.insert_dir("/dest");
        // Destination far in the future: never overwritten.
        fs.insert_file("/dest/f.txt", b"keep", i64::MAX);
        let (tx, _rx) = channel();
        let options = SyncOptions::default();

        let report = sync_with_device(&mut fs, local.path(), "/dest", &options, &tx).await;
        assert_eq!(report.copied, 0);
        assert_eq!(fs.read("/dest/f.txt").unwrap(), b"keep");

        // Destination older than the local file: overwritten.
        fs.insert_file("/dest/f.txt", b"old", 1);
        let report = sync_with_device(&mut fs, local.path(), "/dest", &options, &tx).await;
        assert_eq!(report.copied, 1);
        assert_eq!(fs.read("/dest/f.txt").unwrap(), b"new content");
    }

    #[tokio::test]
    async fn test_type_mismatch_is_warning_not_fatal() {
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join("x"), "file content").unwrap();
        std::fs::write(local.path().join("ok.txt"), "fine").unwrap();

        let mut fs = MemoryFileSystem::new();
        fs.insert_dir("/dest");
        fs.insert_dir("/dest/x");
        let (tx, _rx) = channel();
        let options = SyncOptions::default();

        let report = sync_with_device(&mut fs, local.path(), "/dest", &options, &tx).await;
        // The mismatch is recorded, the other file still syncs.
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("skipped"));
        assert_eq!(fs.read("/dest/ok.txt").unwrap(), b"fine");
        assert!(fs.contains("/dest/x"));
    }

    #[tokio::test]
    async fn test_hidden_entries_skipped_by_default() {
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join(".secret"), "hidden").unwrap();
        std::fs::write(local.path().join("backup~"), "hidden").unwrap();
        std::fs::write(local.path().join("visible.py"), "code").unwrap();

        let mut fs = MemoryFileSystem::new();
        fs.insert_dir("/dest");
        let (tx, _rx) = channel();

        let report = sync_with_device(
            &mut fs,
            local.path(),
            "/dest",
            &SyncOptions::default(),
            &tx,
        )
        .await;
        assert_eq!(report.copied, 1);
        assert!(!fs.contains("/dest/.secret"));
        assert!(!fs.contains("/dest/backup~"));
    }

    #[tokio::test]
    async fn test_sync_errors_event_emitted() {
        let missing = PathBuf::from("/definitely/not/a/real/path");
        let mut fs = MemoryFileSystem::new();
        let (tx, mut rx) = channel();

        let report =
            sync_with_device(&mut fs, &missing, "/dest", &SyncOptions::default(), &tx).await;
        assert!(!report.errors.is_empty());
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, FileManagerEvent::SyncErrors { .. })));
    }

    #[tokio::test]
    async fn test_sync_mounted_copies_and_mirrors() {
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join("a.txt"), "alpha").unwrap();
        std::fs::create_dir(local.path().join("lib")).unwrap();
        std::fs::write(local.path().join("lib/m.py"), "pass").unwrap();

        let mount = tempfile::tempdir().unwrap();
        std::fs::write(mount.path().join("stale.txt"), "bye").unwrap();

        let (tx, _rx) = channel();
        let options = SyncOptions {
            mirror: true,
            show_hidden: false,
        };

        let report = sync_mounted(local.path(), mount.path(), &options, &tx).await;
        assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
        assert_eq!(report.copied, 2);
        assert_eq!(report.deleted, 1);
        assert_eq!(
            std::fs::read(mount.path().join("a.txt")).unwrap(),
            b"alpha"
        );
        assert_eq!(
            std::fs::read(mount.path().join("lib/m.py")).unwrap(),
            b"pass"
        );
        assert!(!mount.path().join("stale.txt").exists());

        // Idempotent: the copies just made are newer than their sources.
        let report = sync_mounted(local.path(), mount.path(), &options, &tx).await;
        assert_eq!(report.copied, 0);
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_sync_mounted_missing_destination_copies_whole_tree() {
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join("f.txt"), "data").unwrap();
        std::fs::create_dir(local.path().join("d")).unwrap();
        std::fs::write(local.path().join("d/g.txt"), "deep").unwrap();

        let parent = tempfile::tempdir().unwrap();
        let mount = parent.path().join("volume");
        let (tx, _rx) = channel();

        let report = sync_mounted(local.path(), &mount, &SyncOptions::default(), &tx).await;
        assert!(report.errors.is_empty());
        assert_eq!(report.copied, 2);
        assert_eq!(std::fs::read(mount.join("d/g.txt")).unwrap(), b"deep");
    }
}
