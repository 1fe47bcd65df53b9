/// Core business logic for serterm
///
/// Everything here is independent of how the session is drawn:
/// - `PortSession`, the connection lifecycle
/// - Message bus and the core task that drives the session
/// - Session log entries and the view model handed to a display surface
/// - Configuration
pub mod bus;
pub mod config;
pub mod error;
pub mod logs;
pub mod runtime;
pub mod session;
pub mod view;

pub use bus::{Bus, CoreToUi, UiToCore};
pub use config::{AppConfig, Overrides};
pub use error::SessionError;
pub use logs::{LogBuffer, LogCategory, LogEntry};
pub use runtime::run_core;
pub use session::{
    ConnectOutcome, DisconnectOutcome, PortSession, ReadEnd, SendOutcome, SessionEvent,
    SessionOptions,
};
pub use view::{ConnectionView, ControlState, DisplaySurface, PortListView};
