//! Shared types for the board filesystem crate.

use chrono::{Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};

// ── Directory entries ────────────────────────────────────────────────────────

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a board directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Raw `st_mode` bits as reported by the board.
    pub mode: u32,
    pub size: u64,
    /// Modification time in seconds of the board's epoch.
    pub mtime: i64,
    pub is_hidden: bool,
    /// The full 10-field `os.stat()` tuple, present when the listing was
    /// requested with `full_stat`.
    #[serde(default)]
    pub stat: Option<Vec<i64>>,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Directory-bit of a POSIX `st_mode`.
pub const STAT_MODE_DIR: u32 = 0x4000;

/// Hidden-entry convention shared by the board-side snippets and the local
/// listings: leading dot or trailing tilde.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.') || name.ends_with('~')
}

// ── Filesystem info ──────────────────────────────────────────────────────────

/// Capacity of one board mount, derived from its statvfs values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsInfo {
    pub name: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

// ── Board introspection ──────────────────────────────────────────────────────

/// Parsed `os.uname()` of the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardVersion {
    pub sysname: String,
    pub nodename: String,
    pub release: String,
    pub version: String,
    pub machine: String,
}

/// Parsed `sys.implementation` of the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardImplementation {
    pub name: String,
    pub version: String,
}

// ── Clock values ─────────────────────────────────────────────────────────────

/// Host clock snapshot handed to the RTC-sync snippet builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockValues {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Day of week, 1 = Monday … 7 = Sunday.
    pub weekday: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// Day of year, 1-based.
    pub yearday: u32,
}

impl ClockValues {
    /// Snapshot the host's local clock.
    pub fn from_local_now() -> Self {
        let now = Local::now();
        Self {
            year: now.year(),
            month: now.month(),
            day: now.day(),
            weekday: now.weekday().number_from_monday(),
            hour: now.hour(),
            minute: now.minute(),
            second: now.second(),
            yearday: now.ordinal(),
        }
    }
}

// ── File manager events ──────────────────────────────────────────────────────

/// Notifications emitted by the file manager.  Front-ends consume these over
/// an mpsc channel instead of receiving return values or errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum FileManagerEvent {
    Listing {
        directory: String,
        entries: Vec<DirEntry>,
    },
    CurrentDirectory {
        directory: String,
    },
    GetDone {
        device_file: String,
        local_file: String,
    },
    PutDone {
        local_file: String,
        device_file: String,
    },
    Removed {
        name: String,
    },
    DirCreated {
        name: String,
    },
    DirRemoved {
        name: String,
    },
    FsInfoResult {
        mounts: Vec<FsInfo>,
    },
    /// One line of synchronisation progress; `depth` is the recursion depth
    /// for indentation.
    SyncProgress {
        depth: usize,
        message: String,
    },
    /// Non-fatal errors collected over a whole synchronisation run.
    SyncErrors {
        messages: Vec<String>,
    },
    SyncDone {
        local_dir: String,
        device_dir: String,
    },
    /// Uniform failure notification: which operation failed and why.
    OperationFailed {
        operation: String,
        message: String,
    },
}
