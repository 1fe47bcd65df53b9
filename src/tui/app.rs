use crate::core::{ConnectionView, LogBuffer, PortListView};
use crate::i18n::Lang;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Ports,
    Input,
}

/// Everything the screen shows. Written by the surface, read by the draw loop.
pub struct App {
    pub ports: PortListView,
    pub selected: usize,
    pub focus: Focus,
    pub connection: ConnectionView,
    pub log: LogBuffer,
    /// Stick to the newest entry; turned off while scrolling back.
    pub follow: bool,
    /// Lines scrolled up from the bottom when not following.
    pub scroll_back: usize,
    pub input: String,
    /// The input submitted to the core and not answered yet.
    pub pending_send: Option<String>,
    pub baud_rates: Vec<u32>,
    pub baud_index: usize,
}

impl App {
    pub fn new(lang: &Lang, baud_rates: Vec<u32>, baud_index: usize) -> Self {
        let baud_index = baud_index.min(baud_rates.len().saturating_sub(1));
        Self {
            ports: PortListView::Entries(Vec::new()),
            selected: 0,
            focus: Focus::Ports,
            connection: ConnectionView::new(lang, true, false),
            log: LogBuffer::new(),
            follow: true,
            scroll_back: 0,
            input: String::new(),
            pending_send: None,
            baud_rates,
            baud_index,
        }
    }

    pub fn set_ports(&mut self, ports: PortListView) {
        self.ports = ports;
        if self.selected >= self.ports.len() {
            self.selected = 0;
        }
    }

    pub fn set_connection(&mut self, view: ConnectionView) {
        if !view.controls.input && self.focus == Focus::Input {
            self.focus = Focus::Ports;
        }
        self.connection = view;
    }

    pub fn next(&mut self) {
        if !self.ports.is_empty() {
            self.selected = (self.selected + 1) % self.ports.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.ports.is_empty() {
            if self.selected == 0 {
                self.selected = self.ports.len() - 1;
            } else {
                self.selected -= 1;
            }
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rates.get(self.baud_index).copied().unwrap_or(9600)
    }

    pub fn next_baud(&mut self) {
        if self.baud_index + 1 < self.baud_rates.len() {
            self.baud_index += 1;
        }
    }

    pub fn prev_baud(&mut self) {
        self.baud_index = self.baud_index.saturating_sub(1);
    }

    /// Input can only be focused while a port is connected.
    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Ports if self.connection.controls.input => Focus::Input,
            _ => Focus::Ports,
        };
    }

    /// Hand the current input over for sending. Refused while a send is in flight.
    pub fn submit(&mut self) -> Option<String> {
        if self.pending_send.is_some() || self.input.trim().is_empty() {
            return None;
        }
        self.pending_send = Some(self.input.clone());
        self.pending_send.clone()
    }

    /// The core answered the last submit. Only the submitted text is removed;
    /// anything typed after Enter stays.
    pub fn finish_send(&mut self, sent: bool) {
        let Some(submitted) = self.pending_send.take() else {
            return;
        };
        if sent {
            if let Some(rest) = self.input.strip_prefix(submitted.as_str()) {
                self.input = rest.to_string();
            }
        }
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.follow = false;
        self.scroll_back = self.scroll_back.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
        if self.scroll_back == 0 {
            self.follow = true;
        }
    }

    pub fn toggle_follow(&mut self) {
        self.follow = !self.follow;
        if self.follow {
            self.scroll_back = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Locale;

    fn app_with_ports(n: usize) -> App {
        let lang = Locale::EnUs.lang();
        let mut app = App::new(&lang, vec![9600, 115200], 0);
        app.set_ports(PortListView::Entries(
            (0..n).map(|i| format!("Port: COM{i}")).collect(),
        ));
        app
    }

    #[test]
    fn test_navigation() {
        let mut app = app_with_ports(2);
        assert_eq!(app.selected, 0);
        app.next();
        assert_eq!(app.selected, 1);
        app.next();
        assert_eq!(app.selected, 0);
        app.prev();
        assert_eq!(app.selected, 1);
    }

    #[test]
    fn selection_resets_when_list_shrinks() {
        let mut app = app_with_ports(3);
        app.selected = 2;
        app.set_ports(PortListView::Empty {
            message: "No devices found".to_string(),
        });
        assert_eq!(app.selected, 0);
        app.next();
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn input_focus_needs_a_connection() {
        let lang = Locale::EnUs.lang();
        let mut app = app_with_ports(1);
        app.toggle_focus();
        assert_eq!(app.focus, Focus::Ports);

        app.set_connection(ConnectionView::new(&lang, true, true));
        app.toggle_focus();
        assert_eq!(app.focus, Focus::Input);

        app.set_connection(ConnectionView::new(&lang, true, false));
        assert_eq!(app.focus, Focus::Ports);
    }

    #[test]
    fn baud_selector_stays_in_range() {
        let mut app = app_with_ports(0);
        app.prev_baud();
        assert_eq!(app.baud_rate(), 9600);
        app.next_baud();
        app.next_baud();
        assert_eq!(app.baud_rate(), 115200);
    }

    #[test]
    fn only_the_submitted_text_is_cleared() {
        let mut app = app_with_ports(0);
        app.input = "led on".to_string();
        assert_eq!(app.submit(), Some("led on".to_string()));
        assert_eq!(app.submit(), None);

        app.input.push_str("led off");
        app.finish_send(true);
        assert_eq!(app.input, "led off");
        assert!(app.pending_send.is_none());
    }

    #[test]
    fn failed_send_keeps_the_input() {
        let mut app = app_with_ports(0);
        app.input = "ping".to_string();
        assert!(app.submit().is_some());
        app.finish_send(false);
        assert_eq!(app.input, "ping");
        assert_eq!(app.submit(), Some("ping".to_string()));
    }

    #[test]
    fn blank_input_is_not_submitted() {
        let mut app = app_with_ports(0);
        app.input = "   ".to_string();
        assert_eq!(app.submit(), None);
        assert!(app.pending_send.is_none());
    }

    #[test]
    fn scrolling_back_to_bottom_resumes_follow() {
        let mut app = app_with_ports(0);
        app.scroll_up(3);
        assert!(!app.follow);
        app.scroll_down(5);
        assert!(app.follow);
        assert_eq!(app.scroll_back, 0);
    }
}
