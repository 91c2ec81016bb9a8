//! Remote filesystem access over the raw REPL.
//!
//! [`ReplFileSystem`] executes the generated snippets through an
//! [`Execute`] implementation and parses their line-oriented replies.  Every
//! board-reported failure is flattened into a single `Err(String)` carrying
//! the last line of the decoded traceback; callers never see raw executor
//! output.

use crate::files::snippets;
use crate::files::types::{
    is_hidden_name, BoardImplementation, BoardVersion, ClockValues, DirEntry, EntryKind, FsInfo,
    STAT_MODE_DIR,
};
use pydeck_repl::repl::executor::Execute;
use pydeck_serial::serial::types::BoardFamily;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Filesystem operations the file manager and the synchroniser are written
/// against.  Implemented by [`ReplFileSystem`] for real boards and by the
/// in-memory double in `memory` for tests.
#[async_trait::async_trait]
pub trait RemoteFileSystem: Send {
    /// Entry names of `dir`, in board-reported order.
    async fn ls(&mut self, dir: &str) -> Result<Vec<String>, String>;

    /// Long listing of `dir`.  Hidden entries are filtered board-side unless
    /// `show_hidden` is set; ordering is board-reported.
    async fn lls(
        &mut self,
        dir: &str,
        full_stat: bool,
        show_hidden: bool,
    ) -> Result<Vec<DirEntry>, String>;

    /// Change the working directory.  An empty `dir` is a local no-op.
    async fn cd(&mut self, dir: &str) -> Result<(), String>;

    /// Current working directory.
    async fn pwd(&mut self) -> Result<String, String>;

    /// Create a directory.  An empty argument is a local no-op.
    async fn mkdir(&mut self, dir: &str) -> Result<(), String>;

    /// Remove an empty directory.  An empty argument is a local no-op.
    async fn rmdir(&mut self, dir: &str) -> Result<(), String>;

    /// Remove a file.  An empty argument is a local no-op.
    async fn rm(&mut self, file: &str) -> Result<(), String>;

    /// Board-side tree delete.  Returns the board's success flag; with
    /// `force` every board-side error is swallowed and the walk continues.
    async fn rmrf(&mut self, name: &str, recursive: bool, force: bool) -> Result<bool, String>;

    /// Read a board file.  Line endings are normalised to `\n`.
    async fn get_bytes(&mut self, device_file: &str) -> Result<Vec<u8>, String>;

    /// Write a board file.  Line endings are normalised to the board-side
    /// `\r` convention before transfer.
    async fn put_bytes(&mut self, data: &[u8], device_file: &str) -> Result<(), String>;

    /// Capacity of every board mount.
    async fn fs_info(&mut self) -> Result<Vec<FsInfo>, String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Reply parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shorten a board traceback to its last non-empty line, falling back to the
/// whole text.
pub fn shorten_error(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| text.trim().to_string())
}

/// Split reply stdout into trimmed non-empty lines.
pub fn parse_lines(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_listing(stdout: &[u8], full_stat: bool) -> Result<Vec<DirEntry>, String> {
    let mut entries = Vec::new();
    for line in parse_lines(stdout) {
        let fields: Vec<&str> = line.split('\t').collect();
        let expected = if full_stat { 11 } else { 4 };
        if fields.len() != expected {
            return Err(format!("malformed listing line: '{}'", line));
        }
        let name = fields[0].to_string();
        let numbers: Vec<i64> = fields[1..]
            .iter()
            .map(|f| {
                f.parse::<i64>()
                    .map_err(|_| format!("malformed listing line: '{}'", line))
            })
            .collect::<Result<_, _>>()?;

        let (mode, size, mtime) = if full_stat {
            (numbers[0] as u32, numbers[6].max(0) as u64, numbers[8])
        } else {
            (numbers[0] as u32, numbers[1].max(0) as u64, numbers[2])
        };
        let kind = if mode & STAT_MODE_DIR != 0 {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        entries.push(DirEntry {
            is_hidden: is_hidden_name(&name),
            name,
            kind,
            mode,
            size,
            mtime,
            stat: full_stat.then(|| numbers.clone()),
        });
    }
    Ok(entries)
}

fn parse_fs_info(stdout: &[u8]) -> Result<Vec<FsInfo>, String> {
    let mut mounts = Vec::new();
    for line in parse_lines(stdout) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            return Err(format!("malformed filesystem info line: '{}'", line));
        }
        let parse = |f: &str| {
            f.parse::<u64>()
                .map_err(|_| format!("malformed filesystem info line: '{}'", line))
        };
        mounts.push(FsInfo {
            name: fields[0].to_string(),
            total_bytes: parse(fields[1])?,
            used_bytes: parse(fields[2])?,
            free_bytes: parse(fields[3])?,
        });
    }
    Ok(mounts)
}

// ── Newline normalisation ────────────────────────────────────────────────────

/// Host → board: every line ending becomes `\r`.
pub fn to_device_newlines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') {
            out.push(b'\r');
            i += 2;
        } else if data[i] == b'\n' {
            out.push(b'\r');
            i += 1;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

/// Board → host: `\r\n` and bare `\r` become `\n`.
pub fn from_device_newlines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' {
            out.push(b'\n');
            i += if data.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  REPL-backed implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Board filesystem driven through a raw-REPL executor.
pub struct ReplFileSystem<E: Execute> {
    exec: E,
}

impl<E: Execute> ReplFileSystem<E> {
    pub fn new(exec: E) -> Self {
        Self { exec }
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.exec
    }

    async fn run(&mut self, commands: &[&str]) -> Result<Vec<u8>, String> {
        let (stdout, stderr) = self.exec.execute(commands).await;
        if !stderr.is_empty() {
            Err(shorten_error(&stderr))
        } else {
            Ok(stdout)
        }
    }

    async fn run_one(&mut self, command: &str) -> Result<Vec<u8>, String> {
        self.run(&[command]).await
    }

    // ── Introspection / clock (board-level, not part of the trait) ───

    /// Parsed `os.uname()` of the board.
    pub async fn version(&mut self) -> Result<BoardVersion, String> {
        let stdout = self.run_one(&snippets::version()).await?;
        let lines = parse_lines(&stdout);
        let line = lines.first().ok_or("empty version reply")?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 5 {
            return Err(format!("malformed version reply: '{}'", line));
        }
        Ok(BoardVersion {
            sysname: fields[0].to_string(),
            nodename: fields[1].to_string(),
            release: fields[2].to_string(),
            version: fields[3].to_string(),
            machine: fields[4].to_string(),
        })
    }

    /// Parsed `sys.implementation` of the board.
    pub async fn implementation(&mut self) -> Result<BoardImplementation, String> {
        let stdout = self.run_one(&snippets::implementation()).await?;
        let lines = parse_lines(&stdout);
        let line = lines.first().ok_or("empty implementation reply")?;
        let (name, version) = line
            .split_once('\t')
            .ok_or_else(|| format!("malformed implementation reply: '{}'", line))?;
        Ok(BoardImplementation {
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Set the board clock from `clock`.  Returns `false` without any board
    /// interaction for families without a settable RTC.
    pub async fn set_clock(
        &mut self,
        family: BoardFamily,
        clock: &ClockValues,
    ) -> Result<bool, String> {
        match snippets::sync_time(family, clock) {
            Some(snippet) => {
                self.run_one(&snippet).await?;
                log::info!("board clock set ({})", family.label());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Board clock as `YYYY-MM-DD HH:MM:SS`.
    pub async fn get_clock(&mut self) -> Result<String, String> {
        let stdout = self.run_one(&snippets::get_time()).await?;
        let lines = parse_lines(&stdout);
        let line = lines.first().ok_or("empty time reply")?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 6 {
            return Err(format!("malformed time reply: '{}'", line));
        }
        Ok(format!(
            "{}-{:0>2}-{:0>2} {:0>2}:{:0>2}:{:0>2}",
            fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]
        ))
    }
}

#[async_trait::async_trait]
impl<E: Execute> RemoteFileSystem for ReplFileSystem<E> {
    async fn ls(&mut self, dir: &str) -> Result<Vec<String>, String> {
        let stdout = self.run_one(&snippets::ls(dir)).await?;
        Ok(parse_lines(&stdout))
    }

    async fn lls(
        &mut self,
        dir: &str,
        full_stat: bool,
        show_hidden: bool,
    ) -> Result<Vec<DirEntry>, String> {
        let stdout = self
            .run_one(&snippets::lls(dir, full_stat, show_hidden))
            .await?;
        parse_listing(&stdout, full_stat)
    }

    async fn cd(&mut self, dir: &str) -> Result<(), String> {
        if dir.is_empty() {
            return Ok(());
        }
        self.run_one(&snippets::cd(dir)).await.map(|_| ())
    }

    async fn pwd(&mut self) -> Result<String, String> {
        let stdout = self.run_one(&snippets::pwd()).await?;
        Ok(parse_lines(&stdout).into_iter().next().unwrap_or_default())
    }

    async fn mkdir(&mut self, dir: &str) -> Result<(), String> {
        if dir.is_empty() {
            return Ok(());
        }
        self.run_one(&snippets::mkdir(dir)).await.map(|_| ())
    }

    async fn rmdir(&mut self, dir: &str) -> Result<(), String> {
        if dir.is_empty() {
            return Ok(());
        }
        self.run_one(&snippets::rmdir(dir)).await.map(|_| ())
    }

    async fn rm(&mut self, file: &str) -> Result<(), String> {
        if file.is_empty() {
            return Ok(());
        }
        self.run_one(&snippets::rm(file)).await.map(|_| ())
    }

    async fn rmrf(&mut self, name: &str, recursive: bool, force: bool) -> Result<bool, String> {
        if name.is_empty() {
            return Ok(false);
        }
        let stdout = self
            .run_one(&snippets::rmrf(name, recursive, force))
            .await?;
        let lines = parse_lines(&stdout);
        Ok(lines.first().map(|l| l == "True").unwrap_or(false))
    }

    async fn get_bytes(&mut self, device_file: &str) -> Result<Vec<u8>, String> {
        let stdout = self.run_one(&snippets::get(device_file)).await?;
        Ok(from_device_newlines(&stdout))
    }

    async fn put_bytes(&mut self, data: &[u8], device_file: &str) -> Result<(), String> {
        let normalised = to_device_newlines(data);
        let commands = snippets::put_commands(device_file, &normalised);
        let refs: Vec<&str> = commands.iter().map(String::as_str).collect();
        self.run(&refs).await.map(|_| ())
    }

    async fn fs_info(&mut self) -> Result<Vec<FsInfo>, String> {
        let stdout = self.run_one(&snippets::fs_info()).await?;
        parse_fs_info(&stdout)
    }
}
