use derive_more::{Display, Error};

use crate::protocol::TransportError;

/// Failures returned by `PortSession` operations.
///
/// Every variant has already been written to the session log as a single
/// error entry by the time the caller sees it.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum SessionError {
    #[display("serial port access is not available")]
    CapabilityUnavailable,
    #[display("no port at index {index}")]
    NoSuchPort { index: usize },
    #[display("port {path} is not in the list")]
    UnknownPort { path: String },
    #[display("a port is already connected")]
    AlreadyConnected,
    #[display("{source}")]
    Transport { source: TransportError },
}

impl From<TransportError> for SessionError {
    fn from(source: TransportError) -> Self {
        match source {
            TransportError::Unsupported => SessionError::CapabilityUnavailable,
            source => SessionError::Transport { source },
        }
    }
}

impl SessionError {
    /// The transport failure behind this error, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            SessionError::Transport { source } => Some(source),
            _ => None,
        }
    }
}
