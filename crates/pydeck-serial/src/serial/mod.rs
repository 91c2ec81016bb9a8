//! Serial crate: sub-modules.

pub mod scanner;
pub mod system;
pub mod transport;
pub mod types;

// Re-export top-level items for convenience.
pub use scanner::{detect_boards, known_boards, lookup_board, BoardInfo, ScanOptions};
pub use transport::{discard_input, read_until, ReadOutcome, SerialTransport, SimulatedTransport};
pub use types::*;
