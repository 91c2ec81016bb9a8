//! Shared types for the serial crate.
//!
//! Covers link configuration, discovered-port metadata, board family
//! classification, and the structured error type.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Link Configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Baud rate the board-side REPL runs at.  The protocol fixes 115200-8N1;
/// the field exists so a future board variant can deviate, not for tuning.
pub const REPL_BAUD_RATE: u32 = 115_200;

fn default_baud() -> u32 {
    REPL_BAUD_RATE
}
fn default_read_timeout() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}

/// Serial link configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkConfig {
    /// Port name (e.g. `/dev/ttyACM0`, `COM3`).
    pub port_name: String,

    /// Baud rate.  8 data bits, no parity, one stop bit are implied.
    #[serde(default = "default_baud")]
    pub baud_rate: u32,

    /// Read timeout in milliseconds for every blocking exchange.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Assert DTR when opening; boards gate their USB-CDC output on it.
    #[serde(default = "default_true")]
    pub dtr_on_open: bool,
}

impl LinkConfig {
    /// Config for the given port with protocol defaults.
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: REPL_BAUD_RATE,
            read_timeout_ms: default_read_timeout(),
            dtr_on_open: true,
        }
    }

    /// Config for the given port with the application's serial settings
    /// (timeout clamped into its supported range).
    pub fn from_settings(
        port_name: impl Into<String>,
        settings: &pydeck_core::config::SerialSettings,
    ) -> Self {
        Self {
            read_timeout_ms: settings.clamped_timeout_ms(),
            ..Self::for_port(port_name)
        }
    }

    /// Shorthand notation (e.g. "115200-8N1").
    pub fn shorthand(&self) -> String {
        format!("{}-8N1", self.baud_rate)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Board Families
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Board family a connected device belongs to.
///
/// Resolved once from USB VID/PID at detection time; each family carries its
/// own strategy for the handful of operations that differ per firmware
/// (currently clock synchronisation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoardFamily {
    /// MicroPython pyboard (STM32).
    PyBoard,
    /// ESP8266 / ESP32 behind a USB-serial bridge or native USB-JTAG.
    Esp,
    /// Any board running CircuitPython.
    CircuitPython,
    /// Raspberry Pi Pico and other RP2040 boards running MicroPython.
    Rp2040,
    /// Pycom WiPy / LoPy family.
    Pycom,
    /// BBC micro:bit.
    Microbit,
    /// Calliope mini.
    CalliopeMini,
    /// Teensy running MicroPython.
    Teensy,
    /// Unrecognised VID/PID, still assumed to speak the raw REPL.
    Generic,
}

impl BoardFamily {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PyBoard => "pyboard",
            Self::Esp => "ESP8266/ESP32",
            Self::CircuitPython => "CircuitPython",
            Self::Rp2040 => "RP2040",
            Self::Pycom => "Pycom",
            Self::Microbit => "BBC micro:bit",
            Self::CalliopeMini => "Calliope mini",
            Self::Teensy => "Teensy",
            Self::Generic => "generic board",
        }
    }

    /// Whether the family exposes a host-settable real-time clock.
    /// micro:bit-class boards have none; unknown boards are left alone.
    pub fn has_settable_rtc(&self) -> bool {
        !matches!(self, Self::Microbit | Self::CalliopeMini | Self::Generic)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Port Information
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Information about a discovered serial port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    /// System port name (e.g. `/dev/ttyACM0`, `COM3`).
    pub port_name: String,

    /// USB Vendor ID, when the port is a USB device.
    pub vid: Option<u16>,

    /// USB Product ID.
    pub pid: Option<u16>,

    /// USB serial number.
    pub serial_number: Option<String>,

    /// Product string reported by the device.
    pub product: Option<String>,

    /// Board family resolved from VID/PID (and product string where the
    /// VID/PID pair is shared, as with DAPLink probes).
    pub family: Option<BoardFamily>,

    /// Friendly / display name.
    pub display_name: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error kinds specific to device communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceErrorKind {
    PortNotFound,
    PermissionDenied,
    NotConnected,
    AlreadyConnected,
    Timeout,
    ProtocolError,
    InvalidResponse,
    DeviceReported,
    IoError,
}

/// Structured device error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
    pub port_name: Option<String>,
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            port_name: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port_name = Some(port.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_config_defaults() {
        let cfg = LinkConfig::for_port("/dev/ttyACM0");
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.read_timeout_ms, 2000);
        assert!(cfg.dtr_on_open);
        assert_eq!(cfg.shorthand(), "115200-8N1");
    }

    #[test]
    fn test_link_config_from_settings_clamps_timeout() {
        let mut settings = pydeck_core::config::SerialSettings::default();
        settings.read_timeout_ms = 1;
        let cfg = LinkConfig::from_settings("COM3", &settings);
        assert_eq!(
            cfg.read_timeout_ms,
            pydeck_core::config::MIN_READ_TIMEOUT_MS
        );
        assert_eq!(cfg.baud_rate, REPL_BAUD_RATE);
    }

    #[test]
    fn test_link_config_serde_defaults() {
        let cfg: LinkConfig = serde_json::from_str(r#"{"portName": "COM3"}"#).unwrap();
        assert_eq!(cfg.port_name, "COM3");
        assert_eq!(cfg.baud_rate, REPL_BAUD_RATE);
        assert!(cfg.dtr_on_open);
    }

    #[test]
    fn test_family_rtc_capability() {
        assert!(BoardFamily::PyBoard.has_settable_rtc());
        assert!(BoardFamily::Esp.has_settable_rtc());
        assert!(BoardFamily::Rp2040.has_settable_rtc());
        assert!(!BoardFamily::Microbit.has_settable_rtc());
        assert!(!BoardFamily::CalliopeMini.has_settable_rtc());
        assert!(!BoardFamily::Generic.has_settable_rtc());
    }

    #[test]
    fn test_device_error_builder() {
        let err = DeviceError::new(DeviceErrorKind::Timeout, "no response")
            .with_port("/dev/ttyUSB0");
        assert_eq!(err.kind, DeviceErrorKind::Timeout);
        assert_eq!(err.port_name.as_deref(), Some("/dev/ttyUSB0"));
        assert!(err.to_string().contains("no response"));
    }
}
