//! Shared connection diagnostics infrastructure.
//!
//! Provides reusable types and helpers for stepwise diagnostic probes.  The
//! REPL crate implements the serial-link probe sequence (port present → port
//! opens → prompt observed) using [`DiagnosticStep`] and [`DiagnosticReport`];
//! this module only carries the report shapes and step constructors so a
//! front-end can render them uniformly.

use serde::{Deserialize, Serialize};
use std::time::Instant;

// ─── Shared types ───────────────────────────────────────────────────────────

/// Result of a single diagnostic probe step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticStep {
    pub name: String,
    /// `"pass"` | `"fail"` | `"skip"` | `"warn"` | `"info"`
    pub status: String,
    pub message: String,
    pub duration_ms: u64,
    pub detail: Option<String>,
}

/// Full diagnostic report for one connection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    /// Serial port the probe ran against.
    pub port_name: String,
    pub steps: Vec<DiagnosticStep>,
    pub summary: String,
    pub root_cause_hint: Option<String>,
    /// Wall-clock milliseconds for the entire diagnostic run.
    pub total_duration_ms: u64,
}

impl DiagnosticReport {
    /// True when no step failed.
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.status != "fail")
    }
}

// ─── Step constructors ──────────────────────────────────────────────────────

impl DiagnosticStep {
    pub fn pass(name: &str, message: impl Into<String>, started: Instant) -> Self {
        Self::with_status(name, "pass", message, started, None)
    }

    pub fn fail(
        name: &str,
        message: impl Into<String>,
        started: Instant,
        detail: Option<String>,
    ) -> Self {
        Self::with_status(name, "fail", message, started, detail)
    }

    pub fn skip(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: "skip".to_string(),
            message: message.into(),
            duration_ms: 0,
            detail: None,
        }
    }

    fn with_status(
        name: &str,
        status: &str,
        message: impl Into<String>,
        started: Instant,
        detail: Option<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            status: status.to_string(),
            message: message.into(),
            duration_ms: started.elapsed().as_millis() as u64,
            detail,
        }
    }
}

/// Build a report from collected steps, deriving the summary line and root
/// cause hint from the first failing step.
pub fn build_report(port_name: &str, steps: Vec<DiagnosticStep>, started: Instant) -> DiagnosticReport {
    let first_fail = steps.iter().find(|s| s.status == "fail");
    let (summary, hint) = match first_fail {
        Some(step) => (
            format!("Failed at step '{}'", step.name),
            Some(step.detail.clone().unwrap_or_else(|| step.message.clone())),
        ),
        None => ("All probes passed".to_string(), None),
    };
    DiagnosticReport {
        port_name: port_name.to_string(),
        steps,
        summary,
        root_cause_hint: hint,
        total_duration_ms: started.elapsed().as_millis() as u64,
    }
}
