//! # PyDeck – Core
//!
//! Shared infrastructure for the PyDeck crates:
//!
//! - **Configuration** – the explicit [`config::PydeckConfig`] object handed
//!   by reference to the components that need it (serial timeout, workspace
//!   directory, hidden-file visibility, clock-sync preference)
//! - **Diagnostics** – reusable [`diagnostics::DiagnosticStep`] /
//!   [`diagnostics::DiagnosticReport`] types for stepwise connection probes

pub mod config;
pub mod diagnostics;

pub use config::PydeckConfig;
pub use diagnostics::{DiagnosticReport, DiagnosticStep};
