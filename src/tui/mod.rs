pub mod app;
pub mod input;
pub mod surface;
pub mod ui;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use ratatui::{backend::CrosstermBackend, prelude::*};
use std::{
    io::{self, Stdout},
    sync::Arc,
    time::Duration,
};

use crate::{
    core::{run_core, AppConfig, Bus, CoreToUi, PortSession, SessionOptions, UiToCore},
    i18n::{self, Lang},
    protocol::SerialTransport,
};
use app::{App, Focus};
use input::{map_key, Action};
use surface::TuiSurface;

const SCROLL_STEP: usize = 5;

pub fn start(
    config: &AppConfig,
    transport: Arc<dyn SerialTransport>,
    preselect: Option<String>,
) -> Result<()> {
    log::info!("[TUI] serterm TUI starting...");
    let lang = i18n::lang();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("serterm-core")
        .build()
        .context("failed to start tokio runtime")?;

    let app = Arc::new(Mutex::new(App::new(
        lang,
        config.baud_rates.clone(),
        config.default_baud_index(),
    )));
    let surface = Arc::new(TuiSurface::new(Arc::clone(&app)));
    let session = PortSession::new(
        transport,
        surface,
        SessionOptions::from_config(config, lang.clone()),
    );

    let (ui_tx, ui_rx) = flume::unbounded::<UiToCore>();
    let (core_tx, core_rx) = flume::unbounded::<CoreToUi>();
    let bus = Bus::new(core_rx, ui_tx);
    let core = runtime.spawn(run_core(session, ui_rx, core_tx, preselect));

    // Setup terminal
    let mut stdout = io::stdout();
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(&mut stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &app, &bus, lang);

    // Restore terminal
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::LeaveAlternateScreen)?;
    crossterm::terminal::disable_raw_mode()?;

    // Let the core close the port before the runtime goes away
    let _ = bus.ui_tx.send(UiToCore::Quit);
    match runtime.block_on(async { tokio::time::timeout(Duration::from_secs(3), core).await }) {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => log::warn!("[TUI] core finished with error: {err:#}"),
        Ok(Err(err)) => log::error!("[TUI] core task panicked: {err}"),
        Err(_) => log::warn!("[TUI] core did not stop in time"),
    }
    runtime.shutdown_timeout(Duration::from_millis(500));

    res
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<&mut Stdout>>,
    app: &Arc<Mutex<App>>,
    bus: &Bus,
    lang: &Lang,
) -> Result<()> {
    loop {
        // Draw with short-lived lock
        {
            let guard = app.lock();
            terminal.draw(|f| ui::render_ui(f, &guard, lang))?;
        }

        while let Ok(msg) = bus.core_rx.try_recv() {
            match msg {
                CoreToUi::Tick => {}
                CoreToUi::SendFinished { sent } => app.lock().finish_send(sent),
                CoreToUi::Quit => {
                    terminal.clear()?;
                    return Ok(());
                }
            }
        }

        if !crossterm::event::poll(Duration::from_millis(100))? {
            continue;
        }
        let crossterm::event::Event::Key(key) = crossterm::event::read()? else {
            continue;
        };

        let focus = app.lock().focus;
        let command = {
            let mut guard = app.lock();
            match map_key(key, focus) {
                Action::Quit => break,
                Action::None => None,
                Action::MoveNext => {
                    guard.next();
                    None
                }
                Action::MovePrev => {
                    guard.prev();
                    None
                }
                Action::Select => (!guard.ports.is_empty())
                    .then_some(UiToCore::SelectPort(guard.selected)),
                Action::Connect => guard
                    .connection
                    .controls
                    .connect
                    .then(|| UiToCore::Connect {
                        baud_rate: guard.baud_rate(),
                    }),
                Action::Disconnect => guard
                    .connection
                    .controls
                    .disconnect
                    .then_some(UiToCore::Disconnect),
                Action::Refresh => guard
                    .connection
                    .controls
                    .refresh
                    .then_some(UiToCore::RefreshPorts),
                Action::BaudNext => {
                    guard.next_baud();
                    None
                }
                Action::BaudPrev => {
                    guard.prev_baud();
                    None
                }
                Action::ToggleFocus => {
                    guard.toggle_focus();
                    None
                }
                Action::Type(c) => {
                    guard.input.push(c);
                    None
                }
                Action::Backspace => {
                    guard.input.pop();
                    None
                }
                // The line is cleared only once the core reports it went out
                Action::Submit if guard.focus == Focus::Input && guard.connection.controls.send => {
                    guard.submit().map(UiToCore::Send)
                }
                Action::Submit => None,
                Action::ScrollUp => {
                    guard.scroll_up(SCROLL_STEP);
                    None
                }
                Action::ScrollDown => {
                    guard.scroll_down(SCROLL_STEP);
                    None
                }
                Action::ToggleFollow => {
                    guard.toggle_follow();
                    None
                }
            }
        };

        if let Some(command) = command {
            log::debug!("[TUI] -> core: {command:?}");
            bus.ui_tx
                .send(command)
                .context("core task is no longer running")?;
        }
    }

    terminal.clear()?;
    Ok(())
}
