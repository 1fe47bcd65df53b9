//! serterm: a terminal for serial devices
//!
//! The crate is split into the transport layer (`protocol`: the serial
//! port abstraction, a `serialport` backend, an in-memory loopback device
//! and the text codec), the UI-independent session (`core`) and a
//! ratatui frontend (`tui`). The binary only parses arguments and hands
//! over to `boot`.

#[doc(hidden)]
pub mod boot;
#[doc(hidden)]
pub mod cli;
pub mod core;
pub mod i18n;
pub mod protocol;
#[doc(hidden)]
pub mod tui;

pub use crate::core::{
    ConnectOutcome, DisconnectOutcome, DisplaySurface, LogCategory, LogEntry, PortSession,
    SendOutcome, SessionError, SessionOptions,
};
pub use protocol::{PortInfo, SerialTransport, TransportError};
