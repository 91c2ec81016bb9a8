//! # PyDeck – Raw-REPL Executor
//!
//! Drives a MicroPython / CircuitPython interpreter through its raw mode:
//! a control-byte handshake enters a non-interactive execution mode, source
//! snippets are terminated with Ctrl-D, and the reply carries stdout and
//! stderr separated by a single embedded Ctrl-D byte.
//!
//! The delimiter bytes and the single raw-mode-entry retry are fixed by the
//! board-side firmware; they are wire-compatibility requirements, not tuning
//! knobs.

pub mod repl;

pub use repl::executor::{Execute, ExecResult, ReplExecutor};
pub use repl::mock::MockBoard;
pub use repl::pump::spawn_output_pump;
