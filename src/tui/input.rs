use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::app::Focus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    MoveNext,
    MovePrev,
    Select,
    Connect,
    Disconnect,
    Refresh,
    BaudNext,
    BaudPrev,
    ToggleFocus,
    Type(char),
    Backspace,
    Submit,
    ScrollUp,
    ScrollDown,
    ToggleFollow,
    None,
}

/// Map a key press to an action. Letters are commands on the port list and
/// text while the input line is focused.
pub fn map_key(key: KeyEvent, focus: Focus) -> Action {
    // Only the initial press counts; Repeat and Release would double actions
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Action::Quit,
            _ => Action::None,
        };
    }

    match (focus, key.code) {
        (_, KeyCode::Tab) => Action::ToggleFocus,
        (_, KeyCode::PageUp) => Action::ScrollUp,
        (_, KeyCode::PageDown) => Action::ScrollDown,

        (Focus::Input, KeyCode::Esc) => Action::ToggleFocus,
        (Focus::Input, KeyCode::Enter) => Action::Submit,
        (Focus::Input, KeyCode::Backspace) => Action::Backspace,
        (Focus::Input, KeyCode::Char(c)) => Action::Type(c),

        (Focus::Ports, KeyCode::Char('q')) | (Focus::Ports, KeyCode::Esc) => Action::Quit,
        (Focus::Ports, KeyCode::Down) | (Focus::Ports, KeyCode::Char('j')) => Action::MoveNext,
        (Focus::Ports, KeyCode::Up) | (Focus::Ports, KeyCode::Char('k')) => Action::MovePrev,
        (Focus::Ports, KeyCode::Enter) => Action::Select,
        (Focus::Ports, KeyCode::Char('c')) => Action::Connect,
        (Focus::Ports, KeyCode::Char('d')) => Action::Disconnect,
        (Focus::Ports, KeyCode::Char('r')) => Action::Refresh,
        (Focus::Ports, KeyCode::Char(']')) => Action::BaudNext,
        (Focus::Ports, KeyCode::Char('[')) => Action::BaudPrev,
        (Focus::Ports, KeyCode::Char('f')) => Action::ToggleFollow,
        _ => Action::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn letters_are_commands_on_the_port_list() {
        assert_eq!(map_key(press(KeyCode::Char('c')), Focus::Ports), Action::Connect);
        assert_eq!(map_key(press(KeyCode::Char('q')), Focus::Ports), Action::Quit);
        assert_eq!(map_key(press(KeyCode::Char(']')), Focus::Ports), Action::BaudNext);
    }

    #[test]
    fn letters_are_text_in_the_input_line() {
        assert_eq!(map_key(press(KeyCode::Char('c')), Focus::Input), Action::Type('c'));
        assert_eq!(map_key(press(KeyCode::Char('q')), Focus::Input), Action::Type('q'));
        assert_eq!(map_key(press(KeyCode::Enter), Focus::Input), Action::Submit);
    }

    #[test]
    fn ctrl_c_quits_everywhere() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(key, Focus::Input), Action::Quit);
        assert_eq!(map_key(key, Focus::Ports), Action::Quit);
    }

    #[test]
    fn releases_are_ignored() {
        let mut key = press(KeyCode::Enter);
        key.kind = KeyEventKind::Release;
        assert_eq!(map_key(key, Focus::Ports), Action::None);
    }
}
