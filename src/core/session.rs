//! Lifecycle of one serial connection.
//!
//! `PortSession` is owned by a single task. Every operation pushes its view
//! changes into the [`DisplaySurface`] and returns an outcome; failures have
//! already been written to the log as exactly one error entry when the
//! caller gets them back.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::{
    config::{default_vendor_filters, AppConfig},
    error::SessionError,
    logs::LogEntry,
    view::{port_label, ConnectionView, ControlState, DisplaySurface, PortListView},
};
use crate::{
    i18n::{self, Lang},
    protocol::{
        encode_line, ByteReader, HotplugEvent, LineEnding, PortHandle, PortInfo,
        SerialTransport, TextDecoder, TransportError, VendorFilter,
    },
};

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub vendor_filters: Vec<VendorFilter>,
    pub line_ending: LineEnding,
    pub lang: Lang,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            vendor_filters: default_vendor_filters(),
            line_ending: LineEnding::Lf,
            lang: i18n::lang().clone(),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig, lang: Lang) -> Self {
        Self {
            vendor_filters: config.vendor_filters.clone(),
            line_ending: config.line_ending,
            lang,
        }
    }
}

/// Why a read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    Cancelled,
    EndOfStream,
    Failed,
}

/// Notifications from background work back to the owning task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ReadLoopEnded { generation: u64, end: ReadEnd },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected { port: PortInfo, baud_rate: u32 },
    AlreadyConnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The trimmed text that went out.
    Sent(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectOutcome {
    Closed,
    /// A port was held but already closed.
    Released,
    NotConnected,
}

struct ReadLoop {
    cancel: flume::Sender<()>,
    task: JoinHandle<()>,
}

pub struct PortSession {
    transport: Arc<dyn SerialTransport>,
    surface: Arc<dyn DisplaySurface>,
    options: SessionOptions,

    supported: Option<bool>,
    hotplug: Option<flume::Receiver<HotplugEvent>>,
    hotplug_registered: bool,

    listed: Vec<Arc<dyn PortHandle>>,
    selected: Option<Arc<dyn PortHandle>>,
    port: Option<Arc<dyn PortHandle>>,
    connected: bool,

    read_loop: Option<ReadLoop>,
    generation: u64,
    events_tx: flume::Sender<SessionEvent>,
    events_rx: flume::Receiver<SessionEvent>,
}

impl PortSession {
    pub fn new(
        transport: Arc<dyn SerialTransport>,
        surface: Arc<dyn DisplaySurface>,
        options: SessionOptions,
    ) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            transport,
            surface,
            options,
            supported: None,
            hotplug: None,
            hotplug_registered: false,
            listed: Vec::new(),
            selected: None,
            port: None,
            connected: false,
            read_loop: None,
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported == Some(true)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn controls(&self) -> ControlState {
        ControlState::for_session(self.is_supported(), self.connected)
    }

    pub fn selected_port(&self) -> Option<PortInfo> {
        self.selected.as_ref().map(|p| p.info())
    }

    /// The port of the live connection.
    pub fn connected_port(&self) -> Option<PortInfo> {
        self.port.as_ref().map(|p| p.info())
    }

    pub fn has_read_loop(&self) -> bool {
        self.read_loop.is_some()
    }

    /// Receiver for read loop notifications; feed them to [`handle_event`](Self::handle_event).
    pub fn events(&self) -> flume::Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    /// Hand the hot-plug subscription made by `initialize` to the caller.
    pub fn take_hotplug(&mut self) -> Option<flume::Receiver<HotplugEvent>> {
        self.hotplug.take()
    }

    /// Check for serial support, subscribe to hot-plug once and list ports.
    pub async fn initialize(&mut self) -> Result<Vec<PortInfo>, SessionError> {
        if !self.transport.is_available() {
            self.supported = Some(false);
            self.publish_connection();
            self.log(LogEntry::error(self.options.lang.unsupported.clone()));
            log::warn!("serial transport unavailable, session disabled");
            return Err(SessionError::CapabilityUnavailable);
        }

        self.supported = Some(true);
        self.publish_connection();
        if !self.hotplug_registered {
            self.hotplug = Some(self.transport.watch_hotplug());
            self.hotplug_registered = true;
        }
        self.refresh_ports().await
    }

    pub async fn refresh_ports(&mut self) -> Result<Vec<PortInfo>, SessionError> {
        self.ensure_supported()?;
        match self.transport.list_ports().await {
            Ok(ports) => {
                let infos: Vec<PortInfo> = ports.iter().map(|p| p.info()).collect();
                log::debug!("refresh_ports: {} port(s)", infos.len());
                self.surface
                    .render_ports(PortListView::build(&self.options.lang, &infos));
                self.listed = ports;
                Ok(infos)
            }
            Err(err) => {
                let template = self.options.lang.list_failed.clone();
                Err(self.fail(&template, err.into()))
            }
        }
    }

    /// Pick one of the ports from the last listing as the connection target.
    pub fn select_port(&mut self, index: usize) -> Result<PortInfo, SessionError> {
        self.ensure_supported()?;
        let template = self.options.lang.select_failed.clone();
        if self.connected {
            return Err(self.fail(&template, SessionError::AlreadyConnected));
        }
        let Some(port) = self.listed.get(index).cloned() else {
            return Err(self.fail(&template, SessionError::NoSuchPort { index }));
        };
        Ok(self.remember_selection(port))
    }

    pub fn select_port_by_path(&mut self, path: &str) -> Result<PortInfo, SessionError> {
        self.ensure_supported()?;
        let template = self.options.lang.select_failed.clone();
        if self.connected {
            return Err(self.fail(&template, SessionError::AlreadyConnected));
        }
        let found = self.listed.iter().find(|p| p.info().path == path).cloned();
        match found {
            Some(port) => Ok(self.remember_selection(port)),
            None => Err(self.fail(
                &template,
                SessionError::UnknownPort {
                    path: path.to_string(),
                },
            )),
        }
    }

    fn remember_selection(&mut self, port: Arc<dyn PortHandle>) -> PortInfo {
        let info = port.info();
        let label = port_label(&self.options.lang, &info);
        self.log(LogEntry::info(i18n::fill(
            &self.options.lang.port_selected,
            &[("port", &label)],
        )));
        self.selected = Some(port);
        info
    }

    /// Open the selected port, asking the transport for one if nothing is selected.
    pub async fn connect(&mut self, baud_rate: u32) -> Result<ConnectOutcome, SessionError> {
        self.ensure_supported()?;
        if self.connected {
            log::debug!("connect: already connected, ignoring");
            return Ok(ConnectOutcome::AlreadyConnected);
        }
        let template = self.options.lang.connect_failed.clone();

        let port = match self.selected.clone() {
            Some(port) => port,
            None => match self.transport.request_port(&self.options.vendor_filters).await {
                Ok(port) => {
                    self.selected = Some(Arc::clone(&port));
                    port
                }
                Err(err) => return Err(self.fail(&template, err.into())),
            },
        };

        if let Err(err) = port.open(baud_rate).await {
            return Err(self.fail(&template, err.into()));
        }
        // No connection without a live read side
        let reader = match port.reader() {
            Ok(reader) => reader,
            Err(err) => {
                if let Err(close_err) = port.close().await {
                    log::warn!("closing after failed reader setup: {close_err}");
                }
                return Err(self.fail(&template, err.into()));
            }
        };

        let info = port.info();
        log::info!("connected to {} at {baud_rate}", info.path);
        self.port = Some(port);
        self.connected = true;
        self.log(LogEntry::info(i18n::fill(
            &self.options.lang.connected_at,
            &[("baud", &baud_rate)],
        )));
        self.publish_connection();
        self.spawn_read_loop(reader);

        Ok(ConnectOutcome::Connected {
            port: info,
            baud_rate,
        })
    }

    fn spawn_read_loop(&mut self, reader: Box<dyn ByteReader>) {
        self.generation += 1;
        let (cancel, cancelled) = flume::bounded(1);
        let task = tokio::spawn(read_loop(
            reader,
            cancelled,
            Arc::clone(&self.surface),
            self.options.lang.read_failed.clone(),
            self.events_tx.clone(),
            self.generation,
        ));
        self.read_loop = Some(ReadLoop { cancel, task });
    }

    /// Write one line. Empty input and a missing connection are skipped silently.
    pub async fn send(&mut self, input: &str) -> Result<SendOutcome, SessionError> {
        self.ensure_supported()?;
        let text = input.trim();
        if !self.connected || text.is_empty() {
            return Ok(SendOutcome::Skipped);
        }
        let Some(port) = self.port.clone() else {
            return Ok(SendOutcome::Skipped);
        };
        let template = self.options.lang.send_failed.clone();

        let mut writer = match port.writer() {
            Ok(writer) => writer,
            Err(TransportError::NotOpen { .. }) => return Ok(SendOutcome::Skipped),
            Err(err) => return Err(self.fail(&template, err.into())),
        };
        let payload = encode_line(text, self.options.line_ending);
        let written = writer.write(&payload).await;
        drop(writer);

        match written {
            Ok(()) => {
                self.log(LogEntry::outgoing(text));
                Ok(SendOutcome::Sent(text.to_string()))
            }
            Err(err) => Err(self.fail(&template, err.into())),
        }
    }

    /// Stop reading, close the port and forget it. State is reset even if closing fails.
    pub async fn disconnect(&mut self) -> Result<DisconnectOutcome, SessionError> {
        self.ensure_supported()?;

        if let Some(read_loop) = self.read_loop.take() {
            let _ = read_loop.cancel.send(());
            drop(read_loop.cancel);
            if let Err(err) = read_loop.task.await {
                log::warn!("read loop task ended abnormally: {err}");
            }
        }

        let result = match self.port.take() {
            Some(port) if port.is_open() => match port.close().await {
                Ok(()) => {
                    self.log(LogEntry::info(self.options.lang.disconnected.clone()));
                    Ok(DisconnectOutcome::Closed)
                }
                Err(err) => {
                    let template = self.options.lang.disconnect_failed.clone();
                    Err(self.fail(&template, err.into()))
                }
            },
            Some(_) => Ok(DisconnectOutcome::Released),
            None => Ok(DisconnectOutcome::NotConnected),
        };

        let was_connected = self.connected;
        self.connected = false;
        self.selected = None;
        if was_connected || result.is_err() {
            self.publish_connection();
        }
        result
    }

    /// React to a background notification. Streams that ended on their own
    /// take the session down.
    pub async fn handle_event(
        &mut self,
        event: SessionEvent,
    ) -> Option<Result<DisconnectOutcome, SessionError>> {
        match event {
            SessionEvent::ReadLoopEnded { generation, end } => {
                if generation != self.generation || !self.connected {
                    return None;
                }
                match end {
                    ReadEnd::Cancelled => None,
                    ReadEnd::EndOfStream => {
                        self.log(LogEntry::info(self.options.lang.stream_closed.clone()));
                        Some(self.disconnect().await)
                    }
                    ReadEnd::Failed => Some(self.disconnect().await),
                }
            }
        }
    }

    /// Log a device arrival or removal and relist.
    pub async fn handle_hotplug(
        &mut self,
        event: HotplugEvent,
    ) -> Result<Vec<PortInfo>, SessionError> {
        self.ensure_supported()?;
        let lang = &self.options.lang;
        let entry = match &event {
            HotplugEvent::Connected(info) => LogEntry::info(i18n::fill(
                &lang.device_connected,
                &[("port", &port_label(lang, info))],
            )),
            HotplugEvent::Disconnected(info) => LogEntry::info(i18n::fill(
                &lang.device_disconnected,
                &[("port", &port_label(lang, info))],
            )),
        };
        self.log(entry);

        if let HotplugEvent::Disconnected(info) = &event {
            let selected_gone = !self.connected
                && self
                    .selected
                    .as_ref()
                    .is_some_and(|p| p.info().path == info.path);
            if selected_gone {
                self.selected = None;
            }
        }
        self.refresh_ports().await
    }

    fn ensure_supported(&self) -> Result<(), SessionError> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(SessionError::CapabilityUnavailable)
        }
    }

    fn publish_connection(&self) {
        self.surface.set_connection(ConnectionView::new(
            &self.options.lang,
            self.is_supported(),
            self.connected,
        ));
    }

    fn log(&self, entry: LogEntry) {
        self.surface.append_log(entry);
    }

    fn fail(&self, template: &str, err: SessionError) -> SessionError {
        log::warn!("session operation failed: {err}");
        self.log(LogEntry::error(i18n::fill(template, &[("error", &err)])));
        err
    }
}

async fn read_loop(
    mut reader: Box<dyn ByteReader>,
    cancelled: flume::Receiver<()>,
    surface: Arc<dyn DisplaySurface>,
    read_failed: String,
    events: flume::Sender<SessionEvent>,
    generation: u64,
) {
    let mut decoder = TextDecoder::new();
    let end = loop {
        tokio::select! {
            biased;
            _ = cancelled.recv_async() => break ReadEnd::Cancelled,
            chunk = reader.read() => match chunk {
                Ok(Some(bytes)) => {
                    let text = decoder.decode(&bytes);
                    if !text.is_empty() {
                        surface.append_log(LogEntry::incoming(text));
                    }
                }
                Ok(None) => break ReadEnd::EndOfStream,
                Err(err) => {
                    log::warn!("read failed: {err}");
                    surface.append_log(LogEntry::error(i18n::fill(
                        &read_failed,
                        &[("error", &err)],
                    )));
                    break ReadEnd::Failed;
                }
            },
        }
    };

    let tail = decoder.finish();
    if !tail.is_empty() {
        surface.append_log(LogEntry::incoming(tail));
    }
    drop(reader);
    log::debug!("read loop {generation} finished: {end:?}");
    let _ = events.send(SessionEvent::ReadLoopEnded { generation, end });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::logs::{LogBuffer, LogCategory},
        i18n::Locale,
        protocol::{LoopbackPort, LoopbackTransport},
    };
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        log: Mutex<LogBuffer>,
        connection: Mutex<Option<ConnectionView>>,
    }

    impl DisplaySurface for Recorder {
        fn render_ports(&self, _view: PortListView) {}

        fn set_connection(&self, view: ConnectionView) {
            *self.connection.lock() = Some(view);
        }

        fn append_log(&self, entry: LogEntry) {
            self.log.lock().push(entry);
        }
    }

    fn session(transport: Arc<LoopbackTransport>) -> (PortSession, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let options = SessionOptions {
            lang: Locale::RuRu.lang(),
            ..SessionOptions::default()
        };
        let session = PortSession::new(transport, recorder.clone(), options);
        (session, recorder)
    }

    #[tokio::test]
    async fn unsupported_platform_blocks_every_operation() {
        let transport = Arc::new(LoopbackTransport::unavailable());
        let (mut session, recorder) = session(transport.clone());

        assert_eq!(
            session.initialize().await,
            Err(SessionError::CapabilityUnavailable)
        );
        assert_eq!(
            session.refresh_ports().await,
            Err(SessionError::CapabilityUnavailable)
        );
        assert_eq!(
            session.connect(9600).await,
            Err(SessionError::CapabilityUnavailable)
        );
        assert_eq!(transport.list_calls(), 0);
        assert_eq!(transport.hotplug_subscriptions(), 0);
        assert_eq!(recorder.log.lock().count(LogCategory::Error), 1);

        let view = recorder.connection.lock().clone().expect("view published");
        assert!(!view.controls.connect && !view.controls.refresh);
    }

    #[tokio::test]
    async fn initialize_subscribes_to_hotplug_once() {
        let transport = Arc::new(LoopbackTransport::demo());
        let (mut session, _recorder) = session(transport.clone());
        session.initialize().await.expect("init");
        session.initialize().await.expect("second init");
        assert_eq!(transport.hotplug_subscriptions(), 1);
        assert!(session.take_hotplug().is_some());
        assert!(session.take_hotplug().is_none());
    }

    #[tokio::test]
    async fn selecting_while_connected_is_refused() {
        let transport = Arc::new(LoopbackTransport::demo());
        let (mut session, recorder) = session(transport);
        session.initialize().await.expect("init");
        session.select_port(0).expect("select");
        session.connect(9600).await.expect("connect");

        assert_eq!(
            session.select_port(0),
            Err(SessionError::AlreadyConnected)
        );
        assert_eq!(
            session.connect(9600).await,
            Ok(ConnectOutcome::AlreadyConnected)
        );
        assert_eq!(recorder.log.lock().count(LogCategory::Error), 1);
        session.disconnect().await.expect("disconnect");
    }

    #[tokio::test]
    async fn unknown_index_is_reported() {
        let transport = Arc::new(LoopbackTransport::new());
        let (mut session, recorder) = session(transport);
        session.initialize().await.expect("init");
        assert_eq!(
            session.select_port(3),
            Err(SessionError::NoSuchPort { index: 3 })
        );
        assert_eq!(recorder.log.lock().count(LogCategory::Error), 1);
    }

    #[tokio::test]
    async fn stream_end_takes_the_session_down() {
        let transport = Arc::new(LoopbackTransport::new());
        let port = LoopbackPort::new(PortInfo::usb("loop0", 0x2341, 0x43));
        transport.add_granted(port.clone());
        let (mut session, _recorder) = session(transport);
        session.initialize().await.expect("init");
        session.select_port(0).expect("select");
        session.connect(9600).await.expect("connect");

        let events = session.events();
        port.end_stream();
        let event = events.recv_async().await.expect("loop ended");
        assert_eq!(
            event,
            SessionEvent::ReadLoopEnded {
                generation: 1,
                end: ReadEnd::EndOfStream
            }
        );
        let outcome = session.handle_event(event).await;
        assert_eq!(outcome, Some(Ok(DisconnectOutcome::Closed)));
        assert!(!session.is_connected());
        assert!(!port.is_open());
        assert_eq!(port.reader_releases(), 1);
    }

    #[tokio::test]
    async fn stale_loop_events_are_ignored() {
        let transport = Arc::new(LoopbackTransport::demo());
        let (mut session, _recorder) = session(transport);
        session.initialize().await.expect("init");
        session.connect(9600).await.expect("connect");
        let stale = SessionEvent::ReadLoopEnded {
            generation: 0,
            end: ReadEnd::Failed,
        };
        assert_eq!(session.handle_event(stale).await, None);
        assert!(session.is_connected());
        session.disconnect().await.expect("disconnect");
    }
}
