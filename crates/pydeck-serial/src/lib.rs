//! # PyDeck – Serial Transport
//!
//! Serial-link foundation for talking to MicroPython / CircuitPython boards:
//!
//! - **Port Discovery** – enumerate serial ports, identify known boards by
//!   USB VID/PID and map them to a [`serial::BoardFamily`]
//! - **Transport** – abstracted byte-level read/write over a serial port,
//!   fixed at the 115200-8N1 framing the board-side REPL expects
//! - **read_until** – the one blocking-with-timeout primitive every
//!   higher-level protocol exchange is built on

pub mod serial;
