//! What the session shows, independent of how it is drawn.

use crate::{
    core::logs::LogEntry,
    i18n::{self, Lang},
    protocol::PortInfo,
};

/// Which controls are usable for a given session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub connect: bool,
    pub refresh: bool,
    pub disconnect: bool,
    pub send: bool,
    pub input: bool,
}

impl ControlState {
    pub fn for_session(supported: bool, connected: bool) -> Self {
        Self {
            connect: supported && !connected,
            refresh: supported,
            disconnect: connected,
            send: connected,
            input: connected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionView {
    pub connected: bool,
    pub status: String,
    pub controls: ControlState,
}

impl ConnectionView {
    pub fn new(lang: &Lang, supported: bool, connected: bool) -> Self {
        let status = if connected {
            lang.status_connected.clone()
        } else {
            lang.status_disconnected.clone()
        };
        Self {
            connected,
            status,
            controls: ControlState::for_session(supported, connected),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortListView {
    Empty { message: String },
    Entries(Vec<String>),
}

impl PortListView {
    pub fn build(lang: &Lang, ports: &[PortInfo]) -> Self {
        if ports.is_empty() {
            return PortListView::Empty {
                message: lang.no_devices.clone(),
            };
        }
        PortListView::Entries(ports.iter().map(|p| port_label(lang, p)).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            PortListView::Empty { .. } => 0,
            PortListView::Entries(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `Vendor: 0x2341, Product: 0x43` for USB devices, `Port: <path>` otherwise.
pub fn port_label(lang: &Lang, info: &PortInfo) -> String {
    match &info.usb {
        Some(usb) => i18n::fill(
            &lang.port_label_usb,
            &[
                ("vendor", &format!("{:x}", usb.vendor_id)),
                ("product", &format!("{:x}", usb.product_id)),
            ],
        ),
        None => i18n::fill(&lang.port_label_path, &[("path", &info.path)]),
    }
}

/// Sink for everything the session wants to show.
///
/// Implementations must not block; they are called from the core task and
/// from the read loop.
pub trait DisplaySurface: Send + Sync {
    fn render_ports(&self, view: PortListView);

    fn set_connection(&self, view: ConnectionView);

    fn append_log(&self, entry: LogEntry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Locale;

    #[test]
    fn control_state_table() {
        let unsupported = ControlState::for_session(false, false);
        assert!(!unsupported.connect && !unsupported.refresh && !unsupported.send);

        let idle = ControlState::for_session(true, false);
        assert!(idle.connect && idle.refresh);
        assert!(!idle.disconnect && !idle.send && !idle.input);

        let live = ControlState::for_session(true, true);
        assert!(!live.connect && live.refresh);
        assert!(live.disconnect && live.send && live.input);
    }

    #[test]
    fn labels_use_lowercase_hex_without_padding() {
        let lang = Locale::RuRu.lang();
        let label = port_label(&lang, &PortInfo::usb("/dev/ttyACM0", 0x2341, 0x0043));
        assert_eq!(label, "Производитель: 0x2341, Продукт: 0x43");
        let label = port_label(&lang, &PortInfo::new("/dev/ttyS0"));
        assert_eq!(label, "Порт: /dev/ttyS0");
    }

    #[test]
    fn empty_list_shows_placeholder() {
        let lang = Locale::RuRu.lang();
        assert_eq!(
            PortListView::build(&lang, &[]),
            PortListView::Empty {
                message: "Устройства не найдены".to_string()
            }
        );
    }

    #[test]
    fn status_text_follows_connection() {
        let lang = Locale::EnUs.lang();
        assert_eq!(ConnectionView::new(&lang, true, true).status, lang.status_connected);
        assert_eq!(
            ConnectionView::new(&lang, true, false).status,
            lang.status_disconnected
        );
    }
}
