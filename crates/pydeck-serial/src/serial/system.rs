//! System-backed transport.
//!
//! Wraps the `serialport` crate behind the async [`SerialTransport`] trait.
//! The library's calls are blocking, so every operation is routed through
//! `tokio::task::spawn_blocking`; the port handle lives behind a `std` mutex
//! shared with those blocking tasks.

use crate::serial::transport::SerialTransport;
use crate::serial::types::LinkConfig;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long one blocking `read` waits before reporting "no data yet".  Kept
/// short because [`read_until`](crate::serial::transport::read_until) owns
/// the real timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

type PortHandle = Arc<Mutex<Option<Box<dyn serialport::SerialPort>>>>;

/// Transport backed by a real serial device.
pub struct SystemTransport {
    name: String,
    inner: PortHandle,
}

impl SystemTransport {
    pub fn new(port_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: port_name.into(),
            inner: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait::async_trait]
impl SerialTransport for SystemTransport {
    async fn open(&self, config: &LinkConfig) -> Result<(), String> {
        if self.is_open() {
            return Err(format!("Port {} already open", self.name));
        }
        let name = self.name.clone();
        let baud = config.baud_rate;
        let dtr = config.dtr_on_open;
        let inner = self.inner.clone();

        tokio::task::spawn_blocking(move || {
            let mut port = serialport::new(name.as_str(), baud)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .timeout(POLL_INTERVAL)
                .open()
                .map_err(|e| format!("cannot open '{}': {}", name, e))?;
            if dtr {
                port.write_data_terminal_ready(true)
                    .map_err(|e| format!("cannot assert DTR on '{}': {}", name, e))?;
            }
            *inner.lock().unwrap() = Some(port);
            Ok(())
        })
        .await
        .map_err(|e| format!("open task failed: {}", e))?
    }

    async fn close(&self) -> Result<(), String> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            inner.lock().unwrap().take();
        })
        .await
        .map_err(|e| format!("close task failed: {}", e))?;
        Ok(())
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, String> {
        let inner = self.inner.clone();
        let len = buf.len();
        let data = tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().unwrap();
            let port = guard.as_mut().ok_or_else(|| "Port not open".to_string())?;
            let mut tmp = vec![0u8; len];
            match port.read(&mut tmp) {
                Ok(n) => {
                    tmp.truncate(n);
                    Ok(tmp)
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
                Err(e) => Err(format!("read failed: {}", e)),
            }
        })
        .await
        .map_err(|e| format!("read task failed: {}", e))??;

        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, String> {
        let inner = self.inner.clone();
        let data = buf.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().unwrap();
            let port = guard.as_mut().ok_or_else(|| "Port not open".to_string())?;
            port.write_all(&data)
                .map_err(|e| format!("write failed: {}", e))?;
            Ok(data.len())
        })
        .await
        .map_err(|e| format!("write task failed: {}", e))?
    }

    async fn drain(&self) -> Result<(), String> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().unwrap();
            let port = guard.as_mut().ok_or_else(|| "Port not open".to_string())?;
            port.flush().map_err(|e| format!("drain failed: {}", e))
        })
        .await
        .map_err(|e| format!("drain task failed: {}", e))?
    }

    async fn set_dtr(&self, state: bool) -> Result<(), String> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().unwrap();
            let port = guard.as_mut().ok_or_else(|| "Port not open".to_string())?;
            port.write_data_terminal_ready(state)
                .map_err(|e| format!("set DTR failed: {}", e))
        })
        .await
        .map_err(|e| format!("set DTR task failed: {}", e))?
    }

    async fn bytes_available(&self) -> Result<usize, String> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = inner.lock().unwrap();
            let port = guard.as_ref().ok_or_else(|| "Port not open".to_string())?;
            port.bytes_to_read()
                .map(|n| n as usize)
                .map_err(|e| format!("bytes_to_read failed: {}", e))
        })
        .await
        .map_err(|e| format!("bytes_to_read task failed: {}", e))?
    }

    fn is_open(&self) -> bool {
        self.inner.lock().unwrap().is_some()
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}
