//! Raw-REPL command execution.
//!
//! One [`ReplExecutor`] exclusively owns the serial link to a board for the
//! lifetime of the connection.  Each [`execute`](ReplExecutor::execute) call
//! walks the interpreter through the raw-mode handshake, sends the batch of
//! snippets strictly in order, and parses the Ctrl-D framed replies.
//!
//! The executor never fails with `Err` for board-reported errors: the result
//! is always a `(stdout, stderr)` pair, and non-empty stderr means the
//! operation failed and stdout must be treated as empty.

use pydeck_serial::serial::transport::{
    discard_input, read_until, render_bytes, SerialTransport,
};
use pydeck_serial::serial::types::LinkConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Protocol constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const ENTER_RAW: u8 = 0x01; // Ctrl-A, enter raw REPL
pub const EXIT_RAW: u8 = 0x02; // Ctrl-B, exit raw REPL
pub const INTERRUPT: u8 = 0x03; // Ctrl-C, interrupt a running program
pub const STREAM_SEP: u8 = 0x04; // Ctrl-D, statement terminator (host side) and stdout/stderr separator (board side)

/// Banner printed by the board when raw mode is entered.
pub const RAW_REPL_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";
/// Per-statement acknowledgement.
pub const STATEMENT_ACK: &[u8] = b"OK";
/// Per-statement terminator: Ctrl-D followed by the raw prompt.
pub const STATEMENT_END: &[u8] = b"\x04>";
/// Prompt of the normal interactive REPL, used to resynchronise on exit.
pub const FRIENDLY_PROMPT: &[u8] = b">>> ";

/// Allowance for a control-byte write to drain to the board.
const DRAIN_ALLOWANCE: Duration = Duration::from_millis(500);
/// Pause between the interrupt presses of the entry sequence.
const INTERRUPT_PAUSE: Duration = Duration::from_millis(10);

/// Combined stdout/stderr of one executed batch.
pub type ExecResult = (Vec<u8>, Vec<u8>);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Execute trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Seam for snippet execution, so the filesystem layer can be exercised with
/// a scripted double instead of a serial link.
#[async_trait::async_trait]
pub trait Execute: Send {
    /// Execute the snippets in order inside one raw-mode session.
    async fn execute(&mut self, commands: &[&str]) -> ExecResult;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Raw-REPL executor owning one serial connection.
pub struct ReplExecutor {
    transport: Arc<dyn SerialTransport>,
    config: LinkConfig,
    timeout: Duration,
    /// Raised while an exchange is reading synchronously, so an unsolicited
    /// REPL-output pump sharing the transport does not consume reply bytes.
    suppress_echo: Arc<AtomicBool>,
    /// Whether the most recent blocking read ended in a timeout.
    last_timed_out: bool,
    session_id: String,
}

impl ReplExecutor {
    pub fn new(transport: Arc<dyn SerialTransport>, config: LinkConfig) -> Self {
        let timeout = Duration::from_millis(config.read_timeout_ms);
        Self {
            transport,
            config,
            timeout,
            suppress_echo: Arc::new(AtomicBool::new(false)),
            last_timed_out: false,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Open the serial link.
    pub async fn connect(&mut self) -> Result<(), String> {
        self.transport.open(&self.config).await?;
        log::info!(
            "session {}: connected to {} ({})",
            self.session_id,
            self.config.port_name,
            self.config.shorthand()
        );
        Ok(())
    }

    /// Close the serial link.
    pub async fn disconnect(&mut self) -> Result<(), String> {
        self.transport.close().await?;
        log::info!("session {}: disconnected", self.session_id);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the most recent blocking read ended in a timeout.
    pub fn last_read_timed_out(&self) -> bool {
        self.last_timed_out
    }

    /// Flag an unsolicited-output pump must observe before forwarding bytes
    /// read from this executor's transport.
    pub fn suppress_echo_flag(&self) -> Arc<AtomicBool> {
        self.suppress_echo.clone()
    }

    /// The shared transport, for wiring an output pump to this connection.
    pub fn transport(&self) -> Arc<dyn SerialTransport> {
        self.transport.clone()
    }

    // ── Raw-mode handshake ────────────────────────────────────────

    /// Drive the interpreter into raw mode.
    ///
    /// Sends Ctrl-B (leave any raw mode already active), interrupts any
    /// running program with three Ctrl-C presses, then sends Ctrl-A and
    /// waits for the raw-REPL banner.  A timeout earns exactly one retry of
    /// the Ctrl-A send; a second timeout fails the whole call.
    async fn enter_raw_mode(&mut self) -> Result<(), String> {
        self.write_control(EXIT_RAW).await?;
        for _ in 0..3 {
            self.write_control(INTERRUPT).await?;
            tokio::time::sleep(INTERRUPT_PAUSE).await;
        }
        discard_input(self.transport.as_ref()).await?;

        self.write_control(ENTER_RAW).await?;
        let mut outcome =
            read_until(self.transport.as_ref(), RAW_REPL_BANNER, None, self.timeout).await?;
        if outcome.timed_out {
            // Firmware occasionally swallows the first Ctrl-A while still
            // tearing down a soft reboot; one resend is part of the protocol.
            self.write_control(ENTER_RAW).await?;
            outcome =
                read_until(self.transport.as_ref(), RAW_REPL_BANNER, None, self.timeout).await?;
        }
        self.last_timed_out = outcome.timed_out;
        if outcome.timed_out {
            return Err(format!(
                "board did not enter raw REPL mode (banner '{}' not seen on {})",
                render_bytes(RAW_REPL_BANNER),
                self.config.port_name
            ));
        }
        Ok(())
    }

    /// Leave raw mode and resynchronise with the interactive prompt.
    async fn exit_raw_mode(&mut self) -> Result<(), String> {
        self.write_control(EXIT_RAW).await?;
        let outcome =
            read_until(self.transport.as_ref(), FRIENDLY_PROMPT, None, self.timeout).await?;
        self.last_timed_out = outcome.timed_out;
        discard_input(self.transport.as_ref()).await?;
        Ok(())
    }

    async fn write_control(&mut self, byte: u8) -> Result<(), String> {
        self.transport.write(&[byte]).await?;
        // Allow the write to drain, but never stall on a wedged link.
        let _ = tokio::time::timeout(DRAIN_ALLOWANCE, self.transport.drain()).await;
        Ok(())
    }

    // ── Batch execution ───────────────────────────────────────────

    /// Execute a batch of snippets inside one raw-mode session, returning
    /// the combined stdout and the first non-empty stderr.
    pub async fn execute_batch(&mut self, commands: &[&str]) -> ExecResult {
        self.suppress_echo.store(true, Ordering::SeqCst);
        let result = self.execute_inner(commands).await;
        self.suppress_echo.store(false, Ordering::SeqCst);
        result
    }

    /// Convenience wrapper for a single snippet.
    pub async fn execute_one(&mut self, command: &str) -> ExecResult {
        self.execute_batch(&[command]).await
    }

    async fn execute_inner(&mut self, commands: &[&str]) -> ExecResult {
        if !self.transport.is_open() {
            return (Vec::new(), b"Not connected to a board.".to_vec());
        }

        if let Err(e) = self.enter_raw_mode().await {
            return (Vec::new(), e.into_bytes());
        }
        if let Err(e) = discard_input(self.transport.as_ref()).await {
            return (Vec::new(), e.into_bytes());
        }

        let mut stdout_acc: Vec<u8> = Vec::new();
        for command in commands {
            if command.trim().is_empty() {
                continue;
            }
            match self.run_statement(command).await {
                Ok((mut out, err)) => {
                    if !err.is_empty() {
                        // A board-side error invalidates the rest of the batch.
                        let _ = self.exit_raw_mode().await;
                        return (Vec::new(), err);
                    }
                    stdout_acc.append(&mut out);
                }
                Err(e) => {
                    let _ = self.exit_raw_mode().await;
                    return (Vec::new(), e.into_bytes());
                }
            }
        }

        if let Err(e) = self.exit_raw_mode().await {
            return (Vec::new(), e.into_bytes());
        }
        (stdout_acc, Vec::new())
    }

    /// Send one statement and parse its framed reply.
    async fn run_statement(&mut self, command: &str) -> Result<ExecResult, String> {
        log::debug!(
            "session {}: sending statement ({} bytes)",
            self.session_id,
            command.len()
        );
        self.transport.write(command.as_bytes()).await?;
        self.write_control(STREAM_SEP).await?;

        let ack = read_until(self.transport.as_ref(), STATEMENT_ACK, None, self.timeout).await?;
        self.last_timed_out = ack.timed_out;
        if ack.timed_out || ack.data != STATEMENT_ACK {
            let residue = discard_input(self.transport.as_ref()).await.unwrap_or_default();
            return Err(format!(
                "Expected 'OK', got '{}', followed by '{}'",
                render_bytes(&ack.data),
                render_bytes(&residue)
            ));
        }

        let reply = read_until(self.transport.as_ref(), STATEMENT_END, None, self.timeout).await?;
        self.last_timed_out = reply.timed_out;
        if reply.timed_out {
            return Err("Timeout while processing commands.".to_string());
        }

        let body = &reply.data[..reply.data.len() - STATEMENT_END.len()];
        let parts: Vec<&[u8]> = body.split(|b| *b == STREAM_SEP).collect();
        if parts.len() != 2 {
            return Err(format!(
                "invalid response received: '{}'",
                render_bytes(body)
            ));
        }
        Ok((parts[0].to_vec(), parts[1].to_vec()))
    }
}

#[async_trait::async_trait]
impl Execute for ReplExecutor {
    async fn execute(&mut self, commands: &[&str]) -> ExecResult {
        self.execute_batch(commands).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::mock::MockBoard;
    use pydeck_serial::serial::transport::SimulatedTransport;

    fn test_config(port: &str) -> LinkConfig {
        let mut config = LinkConfig::for_port(port);
        config.read_timeout_ms = 250;
        config
    }

    async fn connected_executor() -> (Arc<SimulatedTransport>, Arc<MockBoard>, ReplExecutor) {
        let transport = SimulatedTransport::new("/dev/ttyACM0");
        let board = MockBoard::new(transport.clone());
        board.spawn();
        let mut executor = ReplExecutor::new(transport.clone(), test_config("/dev/ttyACM0"));
        executor.connect().await.unwrap();
        (transport, board, executor)
    }

    #[tokio::test]
    async fn test_execute_simple_expression() {
        let (_t, board, mut executor) = connected_executor().await;
        board.push_response(b"2\r\n", b"").await;

        let (out, err) = executor.execute_one("print(1+1)").await;
        assert_eq!(err, b"");
        assert_eq!(out, b"2\r\n");
    }

    #[tokio::test]
    async fn test_execute_accumulates_stdout_across_batch() {
        let (_t, board, mut executor) = connected_executor().await;
        board.push_response(b"a", b"").await;
        board.push_response(b"b", b"").await;

        let (out, err) = executor.execute_batch(&["print('a')", "print('b')"]).await;
        assert_eq!(err, b"");
        assert_eq!(out, b"ab");
    }

    #[tokio::test]
    async fn test_device_error_aborts_batch() {
        let (_t, board, mut executor) = connected_executor().await;
        board.push_response(b"first", b"").await;
        board
            .push_response(b"", b"Traceback (most recent call last):\r\nOSError: 2\r\n")
            .await;
        board.push_response(b"never", b"").await;

        let (out, err) = executor
            .execute_batch(&["ok()", "boom()", "unreached()"])
            .await;
        assert!(out.is_empty());
        assert!(err.starts_with(b"Traceback"));
        // The third statement was never sent, so its scripted reply is left.
        assert_eq!(board.pending_responses().await, 1);
    }

    #[tokio::test]
    async fn test_missing_separator_is_invalid_response() {
        let (_t, board, mut executor) = connected_executor().await;
        // Framed ack but a body without the stdout/stderr separator.
        board.push_raw_reply(b"OKno separator here\x04>").await;

        let (out, err) = executor.execute_one("whatever()").await;
        assert!(out.is_empty());
        let text = String::from_utf8_lossy(&err);
        assert!(text.contains("invalid response received"), "got: {}", text);
    }

    #[tokio::test]
    async fn test_bad_ack_reports_residue() {
        let (_t, board, mut executor) = connected_executor().await;
        board.push_raw_reply(b"ERR trailing junk").await;

        let (out, err) = executor.execute_one("whatever()").await;
        assert!(out.is_empty());
        let text = String::from_utf8_lossy(&err);
        assert!(text.contains("Expected 'OK'"), "got: {}", text);
    }

    #[tokio::test]
    async fn test_banner_timeout_fails_within_bound() {
        let transport = SimulatedTransport::new("/dev/ttyACM0");
        let board = MockBoard::new(transport.clone());
        board.set_banner_enabled(false);
        board.spawn();

        let mut executor = ReplExecutor::new(transport.clone(), test_config("/dev/ttyACM0"));
        executor.connect().await.unwrap();

        let started = std::time::Instant::now();
        let (out, err) = executor.execute_one("print(1)").await;
        let elapsed = started.elapsed();

        assert!(out.is_empty());
        let text = String::from_utf8_lossy(&err);
        assert!(text.contains("raw REPL"), "got: {}", text);
        assert!(executor.last_read_timed_out());
        // One retry: bounded by roughly twice the configured timeout.
        assert!(elapsed < Duration::from_millis(250 * 2 + 500));
    }

    #[tokio::test]
    async fn test_not_connected() {
        let transport = SimulatedTransport::new("/dev/ttyACM0");
        let mut executor = ReplExecutor::new(transport, test_config("/dev/ttyACM0"));

        let (out, err) = executor.execute_one("print(1)").await;
        assert!(out.is_empty());
        assert_eq!(err, b"Not connected to a board.");
    }

    #[tokio::test]
    async fn test_empty_commands_are_skipped() {
        let (_t, board, mut executor) = connected_executor().await;
        board.push_response(b"x", b"").await;

        let (out, err) = executor.execute_batch(&["", "print('x')", "  "]).await;
        assert_eq!(err, b"");
        assert_eq!(out, b"x");
        assert_eq!(board.pending_responses().await, 0);
    }

    #[tokio::test]
    async fn test_execute_with_output_pump_running() {
        let (_t, board, mut executor) = connected_executor().await;
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let pump = crate::repl::pump::spawn_output_pump(
            executor.transport(),
            executor.suppress_echo_flag(),
            tx,
        );

        board.push_response(b"7\r\n", b"").await;
        let (out, err) = executor.execute_one("print(3+4)").await;
        assert_eq!(err, b"");
        assert_eq!(out, b"7\r\n");

        // Unsolicited output outside an exchange still reaches the pump.
        _t.inject_rx(b"free running output").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut seen = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            seen.extend(chunk);
        }
        assert!(seen.ends_with(b"free running output"));
        pump.abort();
    }

    #[tokio::test]
    async fn test_entry_sequence_interrupts_running_program() {
        let (transport, board, mut executor) = connected_executor().await;
        board.push_response(b"", b"").await;

        let _ = executor.execute_one("pass").await;
        let sent = board.seen_control_bytes().await;
        // Ctrl-B first, then three Ctrl-C presses, then Ctrl-A.
        assert_eq!(&sent[..5], &[EXIT_RAW, INTERRUPT, INTERRUPT, INTERRUPT, ENTER_RAW]);
        drop(transport);
    }
}
