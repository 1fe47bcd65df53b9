/// Core task: owns the `PortSession` and serialises everything that touches it
///
/// UI commands, read loop notifications and hot-plug events are all handled
/// here one at a time, so session state is never mutated concurrently.
use anyhow::{anyhow, Result};

use super::{
    bus::{CoreToUi, UiToCore},
    session::{PortSession, SendOutcome, SessionEvent},
};
use crate::protocol::HotplugEvent;

enum Wake {
    Ui(Option<UiToCore>),
    Session(SessionEvent),
    Hotplug(Option<HotplugEvent>),
}

/// Run the session until the UI asks to quit or goes away.
///
/// `initialize` is called first; its failures are already in the session log.
/// `preselect` names a port path to select right after the first listing.
pub async fn run_core(
    mut session: PortSession,
    ui_rx: flume::Receiver<UiToCore>,
    core_tx: flume::Sender<CoreToUi>,
    preselect: Option<String>,
) -> Result<()> {
    match session.initialize().await {
        Ok(_) => {
            if let Some(path) = preselect {
                if let Err(err) = session.select_port_by_path(&path) {
                    log::warn!("preselect {path}: {err}");
                }
            }
        }
        Err(err) => log::warn!("initialize: {err}"),
    }
    notify(&core_tx, CoreToUi::Tick)?;

    let events = session.events();
    let mut hotplug = session.take_hotplug();

    loop {
        let wake = tokio::select! {
            msg = ui_rx.recv_async() => Wake::Ui(msg.ok()),
            Ok(event) = events.recv_async() => Wake::Session(event),
            event = recv_hotplug(&hotplug) => Wake::Hotplug(event),
        };

        match wake {
            Wake::Ui(None) => {
                log::info!("UI channel closed, shutting down core");
                shutdown(&mut session).await;
                return Ok(());
            }
            Wake::Ui(Some(UiToCore::Quit)) => {
                log::info!("Received quit signal");
                shutdown(&mut session).await;
                notify(&core_tx, CoreToUi::Quit)?;
                return Ok(());
            }
            Wake::Ui(Some(cmd)) => {
                if let Some(sent) = handle_command(&mut session, cmd).await {
                    notify(&core_tx, CoreToUi::SendFinished { sent })?;
                }
            }
            Wake::Session(event) => {
                if let Some(Err(err)) = session.handle_event(event).await {
                    log::warn!("teardown after stream end: {err}");
                }
            }
            Wake::Hotplug(Some(event)) => {
                log::debug!("hotplug: {event:?}");
                if let Err(err) = session.handle_hotplug(event).await {
                    log::warn!("hotplug refresh: {err}");
                }
            }
            Wake::Hotplug(None) => {
                log::warn!("hotplug watcher stopped");
                hotplug = None;
            }
        }
        notify(&core_tx, CoreToUi::Tick)?;
    }
}

/// For `Send` commands, returns whether the line went out.
async fn handle_command(session: &mut PortSession, cmd: UiToCore) -> Option<bool> {
    let result = match cmd {
        UiToCore::RefreshPorts => session.refresh_ports().await.map(|_| ()),
        UiToCore::SelectPort(index) => session.select_port(index).map(|_| ()),
        UiToCore::Connect { baud_rate } => session.connect(baud_rate).await.map(|_| ()),
        UiToCore::Disconnect => session.disconnect().await.map(|_| ()),
        UiToCore::Send(text) => {
            return match session.send(&text).await {
                Ok(SendOutcome::Sent(_)) => Some(true),
                Ok(SendOutcome::Skipped) => Some(false),
                Err(err) => {
                    log::debug!("send failed: {err}");
                    Some(false)
                }
            };
        }
        UiToCore::Quit => Ok(()),
    };
    if let Err(err) = result {
        log::debug!("command failed: {err}");
    }
    None
}

async fn recv_hotplug(rx: &Option<flume::Receiver<HotplugEvent>>) -> Option<HotplugEvent> {
    match rx {
        Some(rx) => rx.recv_async().await.ok(),
        None => std::future::pending().await,
    }
}

async fn shutdown(session: &mut PortSession) {
    if session.is_connected() {
        if let Err(err) = session.disconnect().await {
            log::warn!("disconnect on shutdown: {err}");
        }
    }
}

fn notify(core_tx: &flume::Sender<CoreToUi>, msg: CoreToUi) -> Result<()> {
    core_tx
        .send(msg)
        .map_err(|err| anyhow!("Failed to send {:?} to UI: {err}", err.0))
}
