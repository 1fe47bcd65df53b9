use flume::{Receiver, Sender};

/// Messages sent from the UI thread to the core task.
#[derive(Debug, Clone, PartialEq)]
pub enum UiToCore {
    /// Relist the known ports.
    RefreshPorts,
    /// Choose an entry of the rendered port list.
    SelectPort(usize),
    /// Open the selected (or a newly requested) port.
    Connect { baud_rate: u32 },
    Disconnect,
    /// Send one line of user input.
    Send(String),
    /// Graceful shutdown request.
    Quit,
}

/// Messages sent from the core task back to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreToUi {
    /// Core finished handling something; UI may redraw.
    Tick,
    /// A `Send` command was handled; `sent` is false when nothing went out.
    SendFinished { sent: bool },
    /// Core is requesting UI to quit.
    Quit,
}

/// Simple holder passed into UI loop containing the receiving side from core and the sending side to core.
#[derive(Debug, Clone)]
pub struct Bus {
    pub core_rx: Receiver<CoreToUi>,
    pub ui_tx: Sender<UiToCore>,
}

impl Bus {
    pub fn new(core_rx: Receiver<CoreToUi>, ui_tx: Sender<UiToCore>) -> Self {
        Self { core_rx, ui_tx }
    }
}
