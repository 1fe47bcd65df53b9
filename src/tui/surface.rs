use parking_lot::Mutex;
use std::sync::Arc;

use super::app::App;
use crate::core::{ConnectionView, DisplaySurface, LogEntry, PortListView};

/// Writes session output into the shared [`App`] state.
pub struct TuiSurface {
    app: Arc<Mutex<App>>,
}

impl TuiSurface {
    pub fn new(app: Arc<Mutex<App>>) -> Self {
        Self { app }
    }
}

impl DisplaySurface for TuiSurface {
    fn render_ports(&self, view: PortListView) {
        self.app.lock().set_ports(view);
    }

    fn set_connection(&self, view: ConnectionView) {
        self.app.lock().set_connection(view);
    }

    fn append_log(&self, entry: LogEntry) {
        log::debug!("[{}] {}", entry.category, entry.text.trim_end());
        self.app.lock().log.push(entry);
    }
}
