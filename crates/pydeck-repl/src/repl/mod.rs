//! REPL crate: sub-modules.

pub mod diagnostics;
pub mod executor;
pub mod mock;
pub mod pump;
