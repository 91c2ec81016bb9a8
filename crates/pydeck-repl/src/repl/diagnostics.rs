//! Serial-link diagnostics.
//!
//! Stepwise probe for "why won't it connect": port present → port opens →
//! interpreter prompt observed.  Built on the shared report types from
//! `pydeck-core`.

use pydeck_core::diagnostics::{build_report, DiagnosticReport, DiagnosticStep};
use pydeck_serial::serial::scanner::{detect_boards, ScanOptions};
use pydeck_serial::serial::system::SystemTransport;
use pydeck_serial::serial::transport::{read_until, SerialTransport};
use pydeck_serial::serial::types::LinkConfig;
use std::time::{Duration, Instant};

use crate::repl::executor::{EXIT_RAW, FRIENDLY_PROMPT, INTERRUPT};

/// Probe an already-constructed transport: open the port, then check that an
/// interpreter answers Ctrl-C/Ctrl-B with its interactive prompt.
pub async fn probe_link(transport: &dyn SerialTransport, config: &LinkConfig) -> DiagnosticReport {
    let started = Instant::now();
    let mut steps = Vec::new();

    let step_started = Instant::now();
    match transport.open(config).await {
        Ok(()) => {
            steps.push(DiagnosticStep::pass(
                "Port Open",
                format!("opened {} at {}", config.port_name, config.shorthand()),
                step_started,
            ));
        }
        Err(e) => {
            steps.push(DiagnosticStep::fail(
                "Port Open",
                e,
                step_started,
                Some("Check the cable and that no other program holds the port".to_string()),
            ));
            steps.push(DiagnosticStep::skip(
                "Interpreter Prompt",
                "port did not open",
            ));
            return build_report(&config.port_name, steps, started);
        }
    }

    let step_started = Instant::now();
    let prompt = async {
        transport.write(&[INTERRUPT, EXIT_RAW]).await?;
        read_until(
            transport,
            FRIENDLY_PROMPT,
            None,
            Duration::from_millis(config.read_timeout_ms),
        )
        .await
    }
    .await;

    match prompt {
        Ok(outcome) if !outcome.timed_out => {
            steps.push(DiagnosticStep::pass(
                "Interpreter Prompt",
                "interactive prompt observed",
                step_started,
            ));
        }
        Ok(_) => {
            steps.push(DiagnosticStep::fail(
                "Interpreter Prompt",
                "no '>>> ' prompt before the timeout",
                step_started,
                Some(
                    "The device may not run MicroPython / CircuitPython, or a program is \
                     blocking the REPL"
                        .to_string(),
                ),
            ));
        }
        Err(e) => {
            steps.push(DiagnosticStep::fail("Interpreter Prompt", e, step_started, None));
        }
    }

    let _ = transport.close().await;
    build_report(&config.port_name, steps, started)
}

/// Probe a system port by name: check it is present in the scan, then run
/// [`probe_link`] over a real transport.
pub async fn probe_port(config: &LinkConfig) -> DiagnosticReport {
    let started = Instant::now();
    let step_started = Instant::now();

    let present = detect_boards(&ScanOptions::default())
        .map(|boards| {
            boards
                .iter()
                .any(|b| b.port.port_name == config.port_name)
        })
        .unwrap_or(false);
    if !present {
        let steps = vec![
            DiagnosticStep::fail(
                "Port Present",
                format!("{} not found in the port scan", config.port_name),
                step_started,
                Some("Unplug/replug the board and re-run the scan".to_string()),
            ),
            DiagnosticStep::skip("Port Open", "port not present"),
            DiagnosticStep::skip("Interpreter Prompt", "port not present"),
        ];
        return build_report(&config.port_name, steps, started);
    }

    let mut steps = vec![DiagnosticStep::pass(
        "Port Present",
        format!("{} enumerated", config.port_name),
        step_started,
    )];

    let transport = SystemTransport::new(config.port_name.clone());
    let inner = probe_link(transport.as_ref(), config).await;
    steps.extend(inner.steps);
    build_report(&config.port_name, steps, started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::mock::MockBoard;
    use pydeck_serial::serial::transport::SimulatedTransport;

    fn test_config() -> LinkConfig {
        let mut config = LinkConfig::for_port("/dev/ttyACM0");
        config.read_timeout_ms = 200;
        config
    }

    #[tokio::test]
    async fn test_probe_link_healthy_board() {
        let transport = SimulatedTransport::new("/dev/ttyACM0");
        let board = MockBoard::new(transport.clone());
        board.spawn();

        let report = probe_link(transport.as_ref(), &test_config()).await;
        assert!(report.passed(), "summary: {}", report.summary);
        assert_eq!(report.steps.len(), 2);
    }

    #[tokio::test]
    async fn test_probe_link_silent_device() {
        let transport = SimulatedTransport::new("/dev/ttyACM0");
        // No board task: the prompt probe must time out.
        let report = probe_link(transport.as_ref(), &test_config()).await;
        assert!(!report.passed());
        assert_eq!(report.summary, "Failed at step 'Interpreter Prompt'");
    }

    #[tokio::test]
    async fn test_probe_link_port_wont_open() {
        let transport = SimulatedTransport::new("/dev/ttyACM0");
        transport.open(&test_config()).await.unwrap();
        // Second open fails; the prompt step is skipped.
        let report = probe_link(transport.as_ref(), &test_config()).await;
        assert!(!report.passed());
        assert_eq!(report.steps[1].status, "skip");
    }
}
