//! In-memory board filesystem double.
//!
//! Implements [`RemoteFileSystem`] over a path map so the file manager and
//! the synchroniser can be exercised without a board or a serial link.  The
//! store mimics the board semantics the higher layers depend on: parents
//! must exist, `rmrf` reports a flag instead of failing, and hidden entries
//! are filtered inside the listing itself.

use crate::files::remote::RemoteFileSystem;
use crate::files::types::{is_hidden_name, DirEntry, EntryKind, FsInfo, STAT_MODE_DIR};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
enum MemEntry {
    Dir,
    File { data: Vec<u8>, mtime: i64 },
}

/// In-memory [`RemoteFileSystem`].
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    entries: BTreeMap<String, MemEntry>,
    cwd: String,
    put_count: usize,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn norm(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    trimmed.to_string()
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

fn leaf_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Test helpers ─────────────────────────────────────────────

    pub fn insert_dir(&mut self, path: &str) {
        self.entries.insert(norm(path), MemEntry::Dir);
    }

    pub fn insert_file(&mut self, path: &str, data: &[u8], mtime: i64) {
        self.entries.insert(
            norm(path),
            MemEntry::File {
                data: data.to_vec(),
                mtime,
            },
        );
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&norm(path))
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.entries.get(&norm(path)) {
            Some(MemEntry::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn file_mtime(&self, path: &str) -> Option<i64> {
        match self.entries.get(&norm(path)) {
            Some(MemEntry::File { mtime, .. }) => Some(*mtime),
            _ => None,
        }
    }

    /// Number of `put_bytes` calls performed (for idempotence assertions).
    pub fn put_count(&self) -> usize {
        self.put_count
    }

    // ── Internals ────────────────────────────────────────────────

    fn dir_exists(&self, path: &str) -> bool {
        let path = norm(path);
        path.is_empty()
            || path == "/"
            || matches!(self.entries.get(&path), Some(MemEntry::Dir))
    }

    fn children(&self, dir: &str) -> Vec<(String, MemEntry)> {
        let dir = norm(dir);
        let prefix = if dir.is_empty() || dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        self.entries
            .iter()
            .filter(|(path, _)| {
                path.starts_with(&prefix) && !path[prefix.len()..].contains('/')
            })
            .map(|(path, entry)| (leaf_of(path).to_string(), entry.clone()))
            .collect()
    }

    fn remove_subtree(&mut self, path: &str) {
        let path = norm(path);
        let prefix = format!("{}/", path);
        self.entries
            .retain(|key, _| key != &path && !key.starts_with(&prefix));
    }
}

#[async_trait::async_trait]
impl RemoteFileSystem for MemoryFileSystem {
    async fn ls(&mut self, dir: &str) -> Result<Vec<String>, String> {
        if !self.dir_exists(dir) {
            return Err(format!("OSError: [Errno 2] ENOENT: {}", dir));
        }
        Ok(self.children(dir).into_iter().map(|(name, _)| name).collect())
    }

    async fn lls(
        &mut self,
        dir: &str,
        full_stat: bool,
        show_hidden: bool,
    ) -> Result<Vec<DirEntry>, String> {
        if !self.dir_exists(dir) {
            return Err(format!("OSError: [Errno 2] ENOENT: {}", dir));
        }
        Ok(self
            .children(dir)
            .into_iter()
            .filter(|(name, _)| show_hidden || !is_hidden_name(name))
            .map(|(name, entry)| {
                let (kind, mode, size, mtime) = match entry {
                    MemEntry::Dir => (EntryKind::Directory, STAT_MODE_DIR, 0, 0),
                    MemEntry::File { data, mtime } => {
                        (EntryKind::File, 0x8000, data.len() as u64, mtime)
                    }
                };
                DirEntry {
                    is_hidden: is_hidden_name(&name),
                    name,
                    kind,
                    mode,
                    size,
                    mtime,
                    stat: full_stat.then(|| {
                        vec![mode as i64, 0, 0, 0, 0, 0, size as i64, mtime, mtime, mtime]
                    }),
                }
            })
            .collect())
    }

    async fn cd(&mut self, dir: &str) -> Result<(), String> {
        if dir.is_empty() {
            return Ok(());
        }
        if !self.dir_exists(dir) {
            return Err(format!("OSError: [Errno 2] ENOENT: {}", dir));
        }
        self.cwd = norm(dir);
        Ok(())
    }

    async fn pwd(&mut self) -> Result<String, String> {
        Ok(if self.cwd.is_empty() {
            "/".to_string()
        } else {
            self.cwd.clone()
        })
    }

    async fn mkdir(&mut self, dir: &str) -> Result<(), String> {
        if dir.is_empty() {
            return Ok(());
        }
        let path = norm(dir);
        if self.entries.contains_key(&path) {
            return Err(format!("OSError: [Errno 17] EEXIST: {}", dir));
        }
        if !self.dir_exists(&parent_of(&path)) {
            return Err(format!("OSError: [Errno 2] ENOENT: {}", dir));
        }
        self.entries.insert(path, MemEntry::Dir);
        Ok(())
    }

    async fn rmdir(&mut self, dir: &str) -> Result<(), String> {
        if dir.is_empty() {
            return Ok(());
        }
        let path = norm(dir);
        if !matches!(self.entries.get(&path), Some(MemEntry::Dir)) {
            return Err(format!("OSError: [Errno 2] ENOENT: {}", dir));
        }
        if !self.children(&path).is_empty() {
            return Err(format!("OSError: [Errno 39] ENOTEMPTY: {}", dir));
        }
        self.entries.remove(&path);
        Ok(())
    }

    async fn rm(&mut self, file: &str) -> Result<(), String> {
        if file.is_empty() {
            return Ok(());
        }
        let path = norm(file);
        match self.entries.get(&path) {
            Some(MemEntry::File { .. }) => {
                self.entries.remove(&path);
                Ok(())
            }
            _ => Err(format!("OSError: [Errno 2] ENOENT: {}", file)),
        }
    }

    async fn rmrf(&mut self, name: &str, recursive: bool, force: bool) -> Result<bool, String> {
        if name.is_empty() {
            return Ok(false);
        }
        let path = norm(name);
        match self.entries.get(&path) {
            None => Ok(force),
            Some(MemEntry::File { .. }) => {
                self.entries.remove(&path);
                Ok(true)
            }
            Some(MemEntry::Dir) => {
                if !recursive && !self.children(&path).is_empty() {
                    return Ok(force);
                }
                self.remove_subtree(&path);
                Ok(true)
            }
        }
    }

    async fn get_bytes(&mut self, device_file: &str) -> Result<Vec<u8>, String> {
        self.read(device_file)
            .ok_or_else(|| format!("OSError: [Errno 2] ENOENT: {}", device_file))
    }

    async fn put_bytes(&mut self, data: &[u8], device_file: &str) -> Result<(), String> {
        let path = norm(device_file);
        if !self.dir_exists(&parent_of(&path)) {
            return Err(format!("OSError: [Errno 2] ENOENT: {}", device_file));
        }
        self.put_count += 1;
        self.entries.insert(
            path,
            MemEntry::File {
                data: data.to_vec(),
                mtime: now_secs(),
            },
        );
        Ok(())
    }

    async fn fs_info(&mut self) -> Result<Vec<FsInfo>, String> {
        let used: u64 = self
            .entries
            .values()
            .map(|e| match e {
                MemEntry::File { data, .. } => data.len() as u64,
                MemEntry::Dir => 0,
            })
            .sum();
        let total = 2 * 1024 * 1024;
        Ok(vec![FsInfo {
            name: "/flash".to_string(),
            total_bytes: total,
            used_bytes: used,
            free_bytes: total - used,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ls_and_mkdir() {
        let mut fs = MemoryFileSystem::new();
        fs.mkdir("/lib").await.unwrap();
        fs.insert_file("/main.py", b"pass", 100);
        let mut names = fs.ls("/").await.unwrap();
        names.sort();
        assert_eq!(names, vec!["lib", "main.py"]);
        assert_eq!(fs.ls("/lib").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_mkdir_requires_parent() {
        let mut fs = MemoryFileSystem::new();
        assert!(fs.mkdir("/a/b").await.is_err());
        fs.mkdir("/a").await.unwrap();
        fs.mkdir("/a/b").await.unwrap();
    }

    #[tokio::test]
    async fn test_lls_hidden_filtering() {
        let mut fs = MemoryFileSystem::new();
        fs.insert_file("/.hidden", b"", 0);
        fs.insert_file("/backup~", b"", 0);
        fs.insert_file("/visible.py", b"", 0);

        let visible = fs.lls("/", false, false).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "visible.py");

        let all = fs.lls("/", false, true).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_rmrf_force_never_fails() {
        let mut fs = MemoryFileSystem::new();
        assert!(fs.rmrf("/missing", true, true).await.unwrap());
        assert!(!fs.rmrf("/missing", true, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_rmrf_removes_subtree() {
        let mut fs = MemoryFileSystem::new();
        fs.mkdir("/data").await.unwrap();
        fs.insert_file("/data/a.txt", b"a", 0);
        fs.mkdir("/data/sub").await.unwrap();
        fs.insert_file("/data/sub/b.txt", b"b", 0);

        assert!(fs.rmrf("/data", true, false).await.unwrap());
        assert!(!fs.contains("/data"));
        assert!(!fs.contains("/data/sub/b.txt"));
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let mut fs = MemoryFileSystem::new();
        fs.put_bytes(b"content", "/f.txt").await.unwrap();
        assert_eq!(fs.get_bytes("/f.txt").await.unwrap(), b"content");
        assert_eq!(fs.put_count(), 1);
    }

    #[tokio::test]
    async fn test_rmdir_refuses_non_empty() {
        let mut fs = MemoryFileSystem::new();
        fs.mkdir("/d").await.unwrap();
        fs.insert_file("/d/x", b"", 0);
        assert!(fs.rmdir("/d").await.is_err());
    }
}
