use ratatui::{prelude::*, widgets::*};
use unicode_width::UnicodeWidthStr;

use crate::{
    core::{LogCategory, LogEntry, PortListView},
    i18n::Lang,
    tui::app::{App, Focus},
};

const ACCENT: Color = Color::Rgb(0, 150, 0);

pub fn render_ui(f: &mut Frame, app: &App, lang: &Lang) {
    let area = f.area();
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Min(0),
            Constraint::Length(1), // bottom help
        ])
        .split(area);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(main_chunks[1]);

    // Title bar (centered, bold, deep green)
    let title = Paragraph::new(lang.title.as_str())
        .alignment(Alignment::Center)
        .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD));
    f.render_widget(title, main_chunks[0]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(4)])
        .split(chunks[0]);
    render_ports(f, left[0], app, lang);
    render_status(f, left[1], app, lang);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(chunks[1]);
    render_log(f, right[0], app, lang);
    render_input(f, right[1], app, lang);

    let help_text = match app.focus {
        Focus::Ports => lang.help_short.as_str(),
        Focus::Input => lang.help_input.as_str(),
    };
    let help = Paragraph::new(help_text)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
    f.render_widget(help, main_chunks[2]);
}

fn focused_block(title: &str, focused: bool) -> Block<'static> {
    let block = Block::default()
        .title(format!(" {title} "))
        .borders(Borders::ALL)
        .border_type(BorderType::Plain);
    if focused {
        block.border_style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
    } else {
        block
    }
}

fn render_ports(f: &mut Frame, area: Rect, app: &App, lang: &Lang) {
    let block = focused_block(&lang.ports_title, app.focus == Focus::Ports);
    match &app.ports {
        PortListView::Empty { message } => {
            let empty = Paragraph::new(message.as_str())
                .style(Style::default().fg(Color::DarkGray))
                .block(block);
            f.render_widget(empty, area);
        }
        PortListView::Entries(entries) => {
            let items: Vec<ListItem> = entries
                .iter()
                .map(|label| ListItem::new(label.as_str()))
                .collect();
            // Use deep-green highlight with white text for selected item
            let list = List::new(items).block(block).highlight_style(
                Style::default()
                    .bg(Color::Rgb(0, 100, 0))
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            );
            let mut state = ListState::default();
            if !entries.is_empty() {
                state.select(Some(app.selected));
            }
            f.render_stateful_widget(list, area, &mut state);
        }
    }
}

fn render_status(f: &mut Frame, area: Rect, app: &App, lang: &Lang) {
    let status_style = if app.connection.connected {
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Red)
    };
    let baud_style = if app.connection.controls.connect {
        Style::default()
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let lines = vec![
        Line::from(vec![
            Span::styled("● ", status_style),
            Span::styled(app.connection.status.clone(), status_style),
        ]),
        Line::from(vec![
            Span::raw(format!("{}: ", lang.baud_label)),
            Span::styled(
                format!("< {} {} >", app.baud_rate(), lang.baud_unit),
                baud_style,
            ),
        ]),
    ];
    let status = Paragraph::new(lines).block(focused_block(&lang.status_title, false));
    f.render_widget(status, area);
}

fn category_style(category: LogCategory) -> Style {
    match category {
        LogCategory::Incoming => Style::default().fg(Color::Green),
        LogCategory::Outgoing => Style::default().fg(Color::Cyan),
        LogCategory::Info => Style::default().fg(Color::Gray),
        LogCategory::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

/// One screen line per text line; device output often carries its own newlines.
fn entry_lines(entry: &LogEntry) -> Vec<Line<'static>> {
    let style = category_style(entry.category);
    entry
        .line()
        .trim_end_matches(['\r', '\n'])
        .split('\n')
        .map(|part| Line::styled(part.trim_end_matches('\r').to_string(), style))
        .collect()
}

/// The `visible` screen lines that end `scroll_back` lines above the newest one.
///
/// Only the tail of the log is expanded. Scrolling past the oldest line pins
/// the window to the top.
pub fn log_window(
    entries: &[LogEntry],
    visible: usize,
    scroll_back: usize,
) -> Vec<Line<'static>> {
    let wanted = visible.saturating_add(scroll_back);
    let mut tail = Vec::new();
    for entry in entries.iter().rev() {
        if tail.len() >= wanted {
            break;
        }
        tail.extend(entry_lines(entry).into_iter().rev());
    }
    tail.truncate(wanted);
    tail.reverse();
    tail.truncate(visible);
    tail
}

fn render_log(f: &mut Frame, area: Rect, app: &App, lang: &Lang) {
    let title = if app.follow {
        &lang.log_title_follow
    } else {
        &lang.log_title
    };
    let visible = area.height.saturating_sub(2) as usize;
    let scroll_back = if app.follow { 0 } else { app.scroll_back };
    let lines = log_window(app.log.entries(), visible, scroll_back);

    let log = Paragraph::new(lines).block(focused_block(title, false));
    f.render_widget(log, area);
}

fn render_input(f: &mut Frame, area: Rect, app: &App, lang: &Lang) {
    let focused = app.focus == Focus::Input;
    let style = if app.connection.controls.input {
        Style::default()
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let input = Paragraph::new(app.input.as_str())
        .style(style)
        .block(focused_block(&lang.input_title, focused));
    f.render_widget(input, area);

    if focused {
        let width = u16::try_from(app.input.width()).unwrap_or(u16::MAX);
        let max_x = area.x + area.width.saturating_sub(2);
        f.set_cursor_position(Position::new((area.x + 1 + width).min(max_x), area.y + 1));
    }
}
