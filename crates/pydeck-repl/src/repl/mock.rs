//! Scripted board double.
//!
//! [`MockBoard`] speaks the device side of the raw-REPL protocol over a
//! [`SimulatedTransport`]: it answers Ctrl-A with the raw-mode banner,
//! acknowledges each Ctrl-D terminated statement with `OK`, and replies with
//! the next scripted `(stdout, stderr)` pair in the proper Ctrl-D framing.
//! Used by the executor tests here and available to downstream crates that
//! want protocol-level tests without hardware.

use crate::repl::executor::{
    ENTER_RAW, EXIT_RAW, FRIENDLY_PROMPT, INTERRUPT, RAW_REPL_BANNER, STREAM_SEP,
};
use pydeck_serial::serial::transport::SimulatedTransport;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

enum Reply {
    /// Proper framing: `OK` + stdout + Ctrl-D + stderr + Ctrl-D + `>`.
    Framed(Vec<u8>, Vec<u8>),
    /// Injected verbatim, for malformed-reply tests.
    Raw(Vec<u8>),
}

/// Scripted device side of the raw-REPL protocol.
pub struct MockBoard {
    transport: Arc<SimulatedTransport>,
    replies: Mutex<VecDeque<Reply>>,
    control_log: Mutex<Vec<u8>>,
    banner_enabled: AtomicBool,
}

impl MockBoard {
    pub fn new(transport: Arc<SimulatedTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            replies: Mutex::new(VecDeque::new()),
            control_log: Mutex::new(Vec::new()),
            banner_enabled: AtomicBool::new(true),
        })
    }

    /// Queue a framed reply for the next statement.
    pub async fn push_response(&self, stdout: &[u8], stderr: &[u8]) {
        self.replies
            .lock()
            .await
            .push_back(Reply::Framed(stdout.to_vec(), stderr.to_vec()));
    }

    /// Queue bytes injected verbatim as the next statement's reply.
    pub async fn push_raw_reply(&self, bytes: &[u8]) {
        self.replies.lock().await.push_back(Reply::Raw(bytes.to_vec()));
    }

    /// Number of scripted replies not yet consumed.
    pub async fn pending_responses(&self) -> usize {
        self.replies.lock().await.len()
    }

    /// Control bytes observed so far, in order.
    pub async fn seen_control_bytes(&self) -> Vec<u8> {
        self.control_log.lock().await.clone()
    }

    /// When disabled, Ctrl-A is swallowed, simulating a board that never
    /// enters raw mode.
    pub fn set_banner_enabled(&self, enabled: bool) {
        self.banner_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Start the board task.  It runs until the test's runtime shuts down.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let board = self.clone();
        tokio::spawn(async move { board.run().await })
    }

    async fn run(self: Arc<Self>) {
        let mut raw_mode = false;
        let mut pending: Vec<u8> = Vec::new();

        loop {
            self.transport.wait_for_tx().await;
            let bytes = self.transport.drain_tx().await;
            for byte in bytes {
                match byte {
                    ENTER_RAW => {
                        self.control_log.lock().await.push(byte);
                        pending.clear();
                        raw_mode = true;
                        if self.banner_enabled.load(Ordering::SeqCst) {
                            self.transport.inject_rx(RAW_REPL_BANNER).await;
                        }
                    }
                    EXIT_RAW => {
                        self.control_log.lock().await.push(byte);
                        pending.clear();
                        raw_mode = false;
                        self.transport.inject_rx(FRIENDLY_PROMPT).await;
                    }
                    INTERRUPT => {
                        self.control_log.lock().await.push(byte);
                        pending.clear();
                    }
                    STREAM_SEP if raw_mode => {
                        self.control_log.lock().await.push(byte);
                        pending.clear();
                        let reply = self
                            .replies
                            .lock()
                            .await
                            .pop_front()
                            .unwrap_or(Reply::Framed(Vec::new(), Vec::new()));
                        match reply {
                            Reply::Framed(stdout, stderr) => {
                                let mut frame = b"OK".to_vec();
                                frame.extend_from_slice(&stdout);
                                frame.push(STREAM_SEP);
                                frame.extend_from_slice(&stderr);
                                frame.push(STREAM_SEP);
                                frame.push(b'>');
                                self.transport.inject_rx(&frame).await;
                            }
                            Reply::Raw(bytes) => {
                                self.transport.inject_rx(&bytes).await;
                            }
                        }
                    }
                    _ => pending.push(byte),
                }
            }
        }
    }
}
