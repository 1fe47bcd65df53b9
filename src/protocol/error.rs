use derive_more::{Display, Error};

/// Failures reported by a serial transport or one of its port handles.
///
/// Messages are kept as plain text; the session only ever shows them to the
/// user, it never branches on the underlying OS error.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum TransportError {
    #[display("serial port access is not available on this platform")]
    Unsupported,
    #[display("no port was selected")]
    SelectionCancelled,
    #[display("access to {port} was denied")]
    PermissionDenied { port: String },
    #[display("failed to open {port}: {reason}")]
    Open { port: String, reason: String },
    #[display("port {port} is not open")]
    NotOpen { port: String },
    #[display("the {direction} side of {port} is already locked")]
    Locked { port: String, direction: String },
    #[display("{reason}")]
    Read { reason: String },
    #[display("{reason}")]
    Write { reason: String },
    #[display("{reason}")]
    Close { reason: String },
    #[display("{reason}")]
    Listing { reason: String },
}

impl TransportError {
    pub fn read(reason: impl ToString) -> Self {
        Self::Read {
            reason: reason.to_string(),
        }
    }

    pub fn write(reason: impl ToString) -> Self {
        Self::Write {
            reason: reason.to_string(),
        }
    }

    pub fn listing(reason: impl ToString) -> Self {
        Self::Listing {
            reason: reason.to_string(),
        }
    }
}
