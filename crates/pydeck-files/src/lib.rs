//! # PyDeck – Board Filesystem
//!
//! Filesystem access to a MicroPython / CircuitPython board through the
//! raw-REPL executor:
//!
//! - **Snippets** – generated Python micro-snippets, one per operation, with
//!   hidden-entry filtering and recursive deletes running board-side to save
//!   round trips
//! - **Remote filesystem** – [`files::remote::ReplFileSystem`] executes the
//!   snippets and parses their line-oriented replies
//! - **File manager** – an event-emitting facade that never lets a raw error
//!   escape to the consumer
//! - **Synchroniser** – mirror-capable recursive directory sync between a
//!   local directory and the board (serial protocol or mounted volume)

pub mod files;

pub use files::manager::FileManager;
pub use files::remote::{RemoteFileSystem, ReplFileSystem};
pub use files::sync::{sync_mounted, sync_with_device, SyncOptions, SyncReport};
pub use files::types::{DirEntry, EntryKind, FileManagerEvent, FsInfo};
