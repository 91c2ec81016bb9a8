//! Unsolicited-output pump.
//!
//! A board prints freely outside raw mode (a running program, soft-reboot
//! banners).  This task forwards those bytes to a display consumer, but
//! parks while the executor's suppress flag is raised: raw-mode exchanges
//! are read synchronously through `read_until`, and the same bytes must not
//! also be delivered to the display path.

use pydeck_serial::serial::transport::SerialTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Poll interval while the pump is parked or the line is idle.
const IDLE_PAUSE: Duration = Duration::from_millis(10);

/// Forward unsolicited board output to `tx` until the channel closes.
///
/// Obtain `suppress` from
/// [`ReplExecutor::suppress_echo_flag`](crate::repl::executor::ReplExecutor::suppress_echo_flag)
/// and the transport from the same connection, so the pump and the executor
/// coordinate over the shared link.
pub fn spawn_output_pump(
    transport: Arc<dyn SerialTransport>,
    suppress: Arc<AtomicBool>,
    tx: mpsc::Sender<Vec<u8>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 256];
        loop {
            if tx.is_closed() {
                return;
            }
            if suppress.load(Ordering::SeqCst) || !transport.is_open() {
                tokio::time::sleep(IDLE_PAUSE).await;
                continue;
            }
            match transport.read(&mut buf).await {
                Ok(0) => tokio::time::sleep(IDLE_PAUSE).await,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        return;
                    }
                }
                Err(_) => tokio::time::sleep(IDLE_PAUSE).await,
            }
        }
    })
}
