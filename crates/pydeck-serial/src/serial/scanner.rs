//! Serial port discovery and board identification.
//!
//! Scans for available serial ports and classifies the attached device into
//! a [`BoardFamily`] by USB VID/PID against a registry of known MicroPython /
//! CircuitPython boards.  The family is resolved once here, at detection
//! time; the REPL and filesystem layers only consume the resulting enum.

use crate::serial::types::{BoardFamily, PortInfo};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Known boards
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Well-known USB VID/PID pairs for boards and the serial bridges they ship
/// behind.
#[derive(Debug, Clone)]
pub struct KnownBoard {
    pub vid: u16,
    pub pid: u16,
    pub family: BoardFamily,
    pub description: &'static str,
}

/// Registry of known board VID/PID pairs.
///
/// ESP modules usually appear behind a generic USB-serial bridge chip, so
/// those bridge IDs map to [`BoardFamily::Esp`]; a pyboard or Pico shows up
/// with its own native-USB identity.  The DAPLink probe ID is shared by the
/// BBC micro:bit and the Calliope mini and is disambiguated by product
/// string in [`classify`].
pub fn known_boards() -> Vec<KnownBoard> {
    vec![
        // MicroPython pyboard (native USB)
        KnownBoard { vid: 0xF055, pid: 0x9800, family: BoardFamily::PyBoard, description: "pyboard (CDC)" },
        KnownBoard { vid: 0xF055, pid: 0x9801, family: BoardFamily::PyBoard, description: "pyboard (CDC+HID)" },
        KnownBoard { vid: 0xF055, pid: 0x9802, family: BoardFamily::PyBoard, description: "pyboard (CDC+MSC)" },
        // ESP8266 / ESP32 serial bridges
        KnownBoard { vid: 0x1A86, pid: 0x7523, family: BoardFamily::Esp, description: "ESP module (CH340)" },
        KnownBoard { vid: 0x10C4, pid: 0xEA60, family: BoardFamily::Esp, description: "ESP module (CP2102)" },
        KnownBoard { vid: 0x0403, pid: 0x6001, family: BoardFamily::Esp, description: "ESP module (FT232R)" },
        KnownBoard { vid: 0x0403, pid: 0x6015, family: BoardFamily::Esp, description: "ESP module (FT231X)" },
        KnownBoard { vid: 0x303A, pid: 0x1001, family: BoardFamily::Esp, description: "ESP32-S2 (USB-JTAG)" },
        KnownBoard { vid: 0x303A, pid: 0x1002, family: BoardFamily::Esp, description: "ESP32-S3 (USB-JTAG)" },
        // Raspberry Pi Pico running MicroPython
        KnownBoard { vid: 0x2E8A, pid: 0x0005, family: BoardFamily::Rp2040, description: "Raspberry Pi Pico" },
        // Adafruit boards running CircuitPython
        KnownBoard { vid: 0x239A, pid: 0x8014, family: BoardFamily::CircuitPython, description: "Metro M0 Express" },
        KnownBoard { vid: 0x239A, pid: 0x8019, family: BoardFamily::CircuitPython, description: "CircuitPlayground Express" },
        KnownBoard { vid: 0x239A, pid: 0x801F, family: BoardFamily::CircuitPython, description: "Trinket M0" },
        KnownBoard { vid: 0x239A, pid: 0x8021, family: BoardFamily::CircuitPython, description: "Metro M4 Express" },
        KnownBoard { vid: 0x239A, pid: 0x8023, family: BoardFamily::CircuitPython, description: "Feather M0 Express" },
        KnownBoard { vid: 0x239A, pid: 0x80F9, family: BoardFamily::CircuitPython, description: "QT Py RP2040" },
        // BBC micro:bit / Calliope mini (shared DAPLink probe)
        KnownBoard { vid: 0x0D28, pid: 0x0204, family: BoardFamily::Microbit, description: "BBC micro:bit / Calliope mini" },
        // Pycom
        KnownBoard { vid: 0x04D8, pid: 0xEF98, family: BoardFamily::Pycom, description: "Pycom Expansion Board" },
        // Teensy running MicroPython
        KnownBoard { vid: 0x16C0, pid: 0x0483, family: BoardFamily::Teensy, description: "Teensy" },
    ]
}

/// Look up a known board by VID/PID.
pub fn lookup_board(vid: u16, pid: u16) -> Option<KnownBoard> {
    known_boards()
        .into_iter()
        .find(|b| b.vid == vid && b.pid == pid)
}

/// Classify a device into a board family.
///
/// The micro:bit and the Calliope mini share a DAPLink VID/PID, so the
/// product string breaks the tie there.
pub fn classify(vid: u16, pid: u16, product: Option<&str>) -> Option<BoardFamily> {
    let board = lookup_board(vid, pid)?;
    if board.family == BoardFamily::Microbit {
        if let Some(product) = product {
            if product.to_lowercase().contains("calliope") {
                return Some(BoardFamily::CalliopeMini);
            }
        }
    }
    Some(board.family)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Port scanning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Scanner options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScanOptions {
    /// Only report ports whose device was recognised as a known board.
    #[serde(default)]
    pub known_only: bool,

    /// Filter by port name substring (e.g. "ACM", "COM").
    #[serde(default)]
    pub name_filter: Option<String>,
}

/// Result of a board scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInfo {
    pub port: PortInfo,
    /// Registry description when the VID/PID was recognised.
    pub description: Option<String>,
}

/// Generate a display name for a discovered port.
pub fn display_name(port_name: &str, family: Option<BoardFamily>, product: Option<&str>) -> String {
    if let Some(family) = family {
        return format!("{} - {}", port_name, family.label());
    }
    if let Some(product) = product {
        if !product.is_empty() {
            return format!("{} - {}", port_name, product);
        }
    }
    port_name.to_string()
}

/// Build a [`PortInfo`] from raw USB metadata.
pub fn build_port_info(
    port_name: &str,
    vid: Option<u16>,
    pid: Option<u16>,
    serial_number: Option<&str>,
    product: Option<&str>,
) -> PortInfo {
    let family = match (vid, pid) {
        (Some(vid), Some(pid)) => classify(vid, pid, product),
        _ => None,
    };
    PortInfo {
        port_name: port_name.to_string(),
        vid,
        pid,
        serial_number: serial_number.map(|s| s.to_string()),
        product: product.map(|s| s.to_string()),
        family,
        display_name: display_name(port_name, family, product),
    }
}

/// Apply scan filters to a list of discovered ports.
pub fn apply_filters(ports: Vec<PortInfo>, options: &ScanOptions) -> Vec<PortInfo> {
    ports
        .into_iter()
        .filter(|p| {
            if options.known_only && p.family.is_none() {
                return false;
            }
            if let Some(ref filter) = options.name_filter {
                if !p
                    .port_name
                    .to_lowercase()
                    .contains(&filter.to_lowercase())
                {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// Enumerate system serial ports and classify attached boards.
pub fn detect_boards(options: &ScanOptions) -> Result<Vec<BoardInfo>, String> {
    let ports = serialport::available_ports()
        .map_err(|e| format!("port enumeration failed: {}", e))?;

    let mut infos = Vec::with_capacity(ports.len());
    for port in ports {
        let info = match &port.port_type {
            serialport::SerialPortType::UsbPort(usb) => build_port_info(
                &port.port_name,
                Some(usb.vid),
                Some(usb.pid),
                usb.serial_number.as_deref(),
                usb.product.as_deref(),
            ),
            _ => build_port_info(&port.port_name, None, None, None, None),
        };
        infos.push(info);
    }

    let filtered = apply_filters(infos, options);
    log::debug!("board scan found {} port(s)", filtered.len());

    Ok(filtered
        .into_iter()
        .map(|port| {
            let description = port
                .vid
                .zip(port.pid)
                .and_then(|(vid, pid)| lookup_board(vid, pid))
                .map(|b| b.description.to_string());
            BoardInfo { port, description }
        })
        .collect())
}
