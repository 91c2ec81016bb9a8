//! Serial transport abstraction.
//!
//! Provides a platform-agnostic wrapper around serial port I/O plus the one
//! blocking primitive the whole REPL protocol stack rests on:
//! [`read_until`] polls one byte at a time until the accumulated buffer ends
//! with a delimiter, a size cap is hit, or the timeout elapses with no new
//! data.  Callers must always check [`ReadOutcome::timed_out`]: a normal
//! (possibly empty) buffer is indistinguishable from a partially-delivered
//! response except via that flag.

use crate::serial::types::LinkConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Transport trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Platform-agnostic serial transport.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc` and used from multiple async tasks.
#[async_trait::async_trait]
pub trait SerialTransport: Send + Sync {
    /// Open the port with the given configuration (115200-8N1 for the REPL).
    async fn open(&self, config: &LinkConfig) -> Result<(), String>;

    /// Close the port.
    async fn close(&self) -> Result<(), String>;

    /// Read up to `buf.len()` bytes into `buf`.  Returns the number of bytes
    /// read; `0` means no data arrived within the implementation's short
    /// internal poll interval.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, String>;

    /// Write all bytes in `buf`.  Returns the number of bytes accepted.
    async fn write(&self, buf: &[u8]) -> Result<usize, String>;

    /// Wait until all queued output has been handed to the device.
    async fn drain(&self) -> Result<(), String>;

    /// Set DTR (Data Terminal Ready).
    async fn set_dtr(&self, state: bool) -> Result<(), String>;

    /// Number of bytes waiting in the receive buffer.
    async fn bytes_available(&self) -> Result<usize, String>;

    /// Check whether the port is open.
    fn is_open(&self) -> bool;

    /// Retrieve the port name.
    fn port_name(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  read_until
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of a [`read_until`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Everything read, including the delimiter when it was seen.
    pub data: Vec<u8>,
    /// Set when the call returned because the timeout elapsed with no new
    /// data, rather than because the delimiter (or size cap) was reached.
    pub timed_out: bool,
}

impl ReadOutcome {
    /// True when the buffer ends with `delimiter` and no timeout occurred.
    pub fn ends_with(&self, delimiter: &[u8]) -> bool {
        !self.timed_out && self.data.ends_with(delimiter)
    }
}

/// Read one byte at a time until the accumulated buffer ends with
/// `delimiter`, `max_size` bytes have been read, or `timeout` passes without
/// any new byte arriving.
///
/// The timeout is an inactivity timeout: every received byte rearms it.
pub async fn read_until(
    transport: &dyn SerialTransport,
    delimiter: &[u8],
    max_size: Option<usize>,
    timeout: Duration,
) -> Result<ReadOutcome, String> {
    let mut data: Vec<u8> = Vec::new();
    let mut deadline = tokio::time::Instant::now() + timeout;

    loop {
        let mut byte = [0u8; 1];
        let n = match tokio::time::timeout_at(deadline, transport.read(&mut byte)).await {
            Err(_) => {
                return Ok(ReadOutcome {
                    data,
                    timed_out: true,
                })
            }
            Ok(result) => result?,
        };

        if n == 0 {
            if tokio::time::Instant::now() >= deadline {
                return Ok(ReadOutcome {
                    data,
                    timed_out: true,
                });
            }
            continue;
        }

        data.push(byte[0]);
        deadline = tokio::time::Instant::now() + timeout;

        if data.ends_with(delimiter) {
            return Ok(ReadOutcome {
                data,
                timed_out: false,
            });
        }
        if let Some(limit) = max_size {
            if data.len() >= limit {
                return Ok(ReadOutcome {
                    data,
                    timed_out: false,
                });
            }
        }
    }
}

/// Drain and return whatever is sitting in the receive buffer.
pub async fn discard_input(transport: &dyn SerialTransport) -> Result<Vec<u8>, String> {
    let mut discarded = Vec::new();
    loop {
        let available = transport.bytes_available().await?;
        if available == 0 {
            return Ok(discarded);
        }
        let mut buf = vec![0u8; available.min(4096)];
        let n = transport.read(&mut buf).await?;
        if n == 0 {
            return Ok(discarded);
        }
        discarded.extend_from_slice(&buf[..n]);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Wire trace formatting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render protocol bytes for log lines and error messages: printable ASCII
/// verbatim, everything else as `<NN>` hex escapes.  The REPL protocol is
/// framed by control bytes, so those must stay visible in traces.
pub fn render_bytes(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &byte in data {
        if byte.is_ascii_graphic() || byte == b' ' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("<{:02x}>", byte));
        }
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated transport (for testing & offline use)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A fully in-memory transport useful for unit tests and protocol doubles.
pub struct SimulatedTransport {
    name: String,
    open: AtomicBool,
    dtr: AtomicBool,
    config: Mutex<Option<LinkConfig>>,
    rx_buf: Mutex<VecDeque<u8>>,
    tx_buf: Mutex<VecDeque<u8>>,
    rx_notify: Notify,
    tx_notify: Notify,
}

impl SimulatedTransport {
    /// Create a new simulated transport for the given port name.
    pub fn new(port_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: port_name.into(),
            open: AtomicBool::new(false),
            dtr: AtomicBool::new(false),
            config: Mutex::new(None),
            rx_buf: Mutex::new(VecDeque::with_capacity(4096)),
            tx_buf: Mutex::new(VecDeque::with_capacity(4096)),
            rx_notify: Notify::new(),
            tx_notify: Notify::new(),
        })
    }

    /// Inject bytes into the receive buffer (simulate board output).
    pub async fn inject_rx(&self, data: &[u8]) {
        let mut buf = self.rx_buf.lock().await;
        buf.extend(data);
        self.rx_notify.notify_waiters();
    }

    /// Drain all bytes from the transmit buffer (what the host sent).
    pub async fn drain_tx(&self) -> Vec<u8> {
        let mut buf = self.tx_buf.lock().await;
        buf.drain(..).collect()
    }

    /// Peek at the transmit buffer contents without draining.
    pub async fn peek_tx(&self) -> Vec<u8> {
        let buf = self.tx_buf.lock().await;
        buf.iter().copied().collect()
    }

    /// Wait until the host has written something (used by protocol doubles).
    pub async fn wait_for_tx(&self) {
        loop {
            {
                let buf = self.tx_buf.lock().await;
                if !buf.is_empty() {
                    return;
                }
            }
            self.tx_notify.notified().await;
        }
    }

    /// Current DTR state.
    pub fn dtr(&self) -> bool {
        self.dtr.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SerialTransport for SimulatedTransport {
    async fn open(&self, config: &LinkConfig) -> Result<(), String> {
        if self.open.load(Ordering::SeqCst) {
            return Err(format!("Port {} already open", self.name));
        }
        let mut cfg = self.config.lock().await;
        *cfg = Some(config.clone());
        self.dtr.store(config.dtr_on_open, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), String> {
        self.open.store(false, Ordering::SeqCst);
        self.dtr.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, String> {
        if !self.open.load(Ordering::SeqCst) {
            return Err("Port not open".to_string());
        }
        let mut rx = self.rx_buf.lock().await;
        if rx.is_empty() {
            drop(rx);
            // Wait briefly for data; the caller's read loop handles timeouts.
            tokio::select! {
                _ = self.rx_notify.notified() => {},
                _ = tokio::time::sleep(Duration::from_millis(10)) => {},
            }
            rx = self.rx_buf.lock().await;
        }
        let count = buf.len().min(rx.len());
        for b in buf.iter_mut().take(count) {
            *b = rx.pop_front().unwrap();
        }
        Ok(count)
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, String> {
        if !self.open.load(Ordering::SeqCst) {
            return Err("Port not open".to_string());
        }
        let mut tx = self.tx_buf.lock().await;
        tx.extend(buf);
        drop(tx);
        self.tx_notify.notify_waiters();
        Ok(buf.len())
    }

    async fn drain(&self) -> Result<(), String> {
        Ok(())
    }

    async fn set_dtr(&self, state: bool) -> Result<(), String> {
        self.dtr.store(state, Ordering::SeqCst);
        Ok(())
    }

    async fn bytes_available(&self) -> Result<usize, String> {
        let rx = self.rx_buf.lock().await;
        Ok(rx.len())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}
