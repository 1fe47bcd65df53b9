//! In-memory serial devices.
//!
//! Each [`LoopbackPort`] echoes whatever is written to it back to its read
//! side, which makes it usable both as a demo device (`--loopback`) and as a
//! scriptable fake in tests: data, end of stream and failures can be injected
//! from the outside, and lock releases are counted.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use super::{
    error::TransportError,
    transport::{
        ByteReader, ByteWriter, HotplugEvent, PortHandle, PortInfo, SerialTransport,
        StreamLease, VendorFilter,
    },
};

#[derive(Debug)]
enum Feed {
    Chunk(Bytes),
    End,
    Fail(String),
}

#[derive(Debug, Default)]
struct Faults {
    open: Option<String>,
    reader: Option<String>,
    close: Option<String>,
    write: Option<String>,
}

#[derive(Debug, Default)]
struct LoopbackState {
    open: bool,
    baud_rate: Option<u32>,
    written: Vec<u8>,
}

pub struct LoopbackPort {
    info: PortInfo,
    state: Arc<Mutex<LoopbackState>>,
    faults: Mutex<Faults>,
    echo: AtomicBool,
    feed_tx: flume::Sender<Feed>,
    feed_rx: flume::Receiver<Feed>,
    reader_flag: Arc<AtomicBool>,
    writer_flag: Arc<AtomicBool>,
    reader_releases: Arc<AtomicUsize>,
    write_calls: Arc<AtomicUsize>,
}

impl LoopbackPort {
    pub fn new(info: PortInfo) -> Arc<Self> {
        let (feed_tx, feed_rx) = flume::unbounded();
        Arc::new(Self {
            info,
            state: Arc::new(Mutex::new(LoopbackState::default())),
            faults: Mutex::new(Faults::default()),
            echo: AtomicBool::new(true),
            feed_tx,
            feed_rx,
            reader_flag: Arc::new(AtomicBool::new(false)),
            writer_flag: Arc::new(AtomicBool::new(false)),
            reader_releases: Arc::new(AtomicUsize::new(0)),
            write_calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn set_echo(&self, enabled: bool) {
        self.echo.store(enabled, Ordering::SeqCst);
    }

    /// Simulate bytes arriving from the device.
    pub fn inject(&self, data: &[u8]) {
        let _ = self.feed_tx.send(Feed::Chunk(Bytes::copy_from_slice(data)));
    }

    /// Simulate the device closing its stream.
    pub fn end_stream(&self) {
        let _ = self.feed_tx.send(Feed::End);
    }

    pub fn fail_next_read(&self, reason: impl Into<String>) {
        let _ = self.feed_tx.send(Feed::Fail(reason.into()));
    }

    pub fn fail_open(&self, reason: impl Into<String>) {
        self.faults.lock().open = Some(reason.into());
    }

    /// Refuse to hand out a reader, like a native handle that cannot be cloned.
    pub fn fail_reader(&self, reason: impl Into<String>) {
        self.faults.lock().reader = Some(reason.into());
    }

    pub fn fail_close(&self, reason: impl Into<String>) {
        self.faults.lock().close = Some(reason.into());
    }

    pub fn fail_write(&self, reason: impl Into<String>) {
        self.faults.lock().write = Some(reason.into());
    }

    /// Everything written since the port was created.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn reader_releases(&self) -> usize {
        self.reader_releases.load(Ordering::SeqCst)
    }

    pub fn reader_locked(&self) -> bool {
        self.reader_flag.load(Ordering::SeqCst)
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.state.lock().baud_rate
    }

    fn not_open(&self) -> TransportError {
        TransportError::NotOpen {
            port: self.info.path.clone(),
        }
    }
}

#[async_trait]
impl PortHandle for LoopbackPort {
    fn info(&self) -> PortInfo {
        self.info.clone()
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    async fn open(&self, baud_rate: u32) -> Result<(), TransportError> {
        if let Some(reason) = self.faults.lock().open.clone() {
            return Err(TransportError::Open {
                port: self.info.path.clone(),
                reason,
            });
        }
        let mut state = self.state.lock();
        if state.open {
            return Err(TransportError::Open {
                port: self.info.path.clone(),
                reason: "already open".to_string(),
            });
        }
        // Whatever was queued for a previous session is stale now
        self.feed_rx.drain();
        state.open = true;
        state.baud_rate = Some(baud_rate);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(reason) = self.faults.lock().close.clone() {
            return Err(TransportError::Close { reason });
        }
        let mut state = self.state.lock();
        if !state.open {
            return Err(self.not_open());
        }
        state.open = false;
        let _ = self.feed_tx.send(Feed::End);
        Ok(())
    }

    fn reader(&self) -> Result<Box<dyn ByteReader>, TransportError> {
        if !self.is_open() {
            return Err(self.not_open());
        }
        if let Some(reason) = self.faults.lock().reader.clone() {
            return Err(TransportError::Read { reason });
        }
        let lease = StreamLease::acquire(&self.reader_flag, &self.info.path, "read")?;
        Ok(Box::new(LoopbackReader {
            feed: self.feed_rx.clone(),
            releases: Arc::clone(&self.reader_releases),
            _lease: lease,
        }))
    }

    fn writer(&self) -> Result<Box<dyn ByteWriter>, TransportError> {
        if !self.is_open() {
            return Err(self.not_open());
        }
        let lease = StreamLease::acquire(&self.writer_flag, &self.info.path, "write")?;
        Ok(Box::new(LoopbackWriter {
            fault: self.faults.lock().write.clone(),
            echo: self.echo.load(Ordering::SeqCst),
            feed: self.feed_tx.clone(),
            state: Arc::clone(&self.state),
            calls: Arc::clone(&self.write_calls),
            _lease: lease,
        }))
    }
}

struct LoopbackReader {
    feed: flume::Receiver<Feed>,
    releases: Arc<AtomicUsize>,
    _lease: StreamLease,
}

impl Drop for LoopbackReader {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ByteReader for LoopbackReader {
    async fn read(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.feed.recv_async().await {
            Ok(Feed::Chunk(bytes)) => Ok(Some(bytes)),
            Ok(Feed::End) | Err(_) => Ok(None),
            Ok(Feed::Fail(reason)) => Err(TransportError::Read { reason }),
        }
    }
}

struct LoopbackWriter {
    fault: Option<String>,
    echo: bool,
    feed: flume::Sender<Feed>,
    state: Arc<Mutex<LoopbackState>>,
    calls: Arc<AtomicUsize>,
    _lease: StreamLease,
}

#[async_trait]
impl ByteWriter for LoopbackWriter {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.fault.clone() {
            return Err(TransportError::Write { reason });
        }
        self.state.lock().written.extend_from_slice(data);
        if self.echo {
            let _ = self.feed.send(Feed::Chunk(Bytes::copy_from_slice(data)));
        }
        Ok(())
    }
}

/// A set of in-memory devices behaving like a platform serial API.
///
/// `devices` are physically present, `granted` is the subset the user has
/// already given access to; `request_port` grants the first matching device.
pub struct LoopbackTransport {
    available: bool,
    devices: Mutex<Vec<Arc<LoopbackPort>>>,
    granted: Mutex<Vec<String>>,
    subscribers: Mutex<Vec<flume::Sender<HotplugEvent>>>,
    listing_fault: Mutex<Option<String>>,
    list_calls: AtomicUsize,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            available: true,
            devices: Mutex::new(Vec::new()),
            granted: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            listing_fault: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// A transport on a platform without serial support.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// One echoing board that looks like an Arduino Uno, already granted.
    pub fn demo() -> Self {
        let transport = Self::new();
        transport.add_granted(LoopbackPort::new(PortInfo::usb("loop0", 0x2341, 0x0043)));
        transport
    }

    /// Attach a device the user has not granted yet.
    pub fn add_device(&self, port: Arc<LoopbackPort>) {
        self.devices.lock().push(port);
    }

    /// Attach a device that shows up in `list_ports` right away.
    pub fn add_granted(&self, port: Arc<LoopbackPort>) {
        self.granted.lock().push(port.info.path.clone());
        self.devices.lock().push(port);
    }

    /// Plug a granted device in and notify subscribers.
    pub fn plug(&self, port: Arc<LoopbackPort>) {
        let info = port.info();
        self.add_granted(port);
        self.notify(HotplugEvent::Connected(info));
    }

    /// Pull a device out: its stream ends and subscribers are notified.
    pub fn unplug(&self, path: &str) {
        let removed = {
            let mut devices = self.devices.lock();
            let index = devices.iter().position(|d| d.info.path == path);
            index.map(|i| devices.remove(i))
        };
        self.granted.lock().retain(|p| p != path);
        if let Some(port) = removed {
            port.end_stream();
            self.notify(HotplugEvent::Disconnected(port.info()));
        }
    }

    pub fn fail_listing(&self, reason: Option<String>) {
        *self.listing_fault.lock() = reason;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of live hot-plug subscriptions.
    pub fn hotplug_subscriptions(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_disconnected());
        subscribers.len()
    }

    fn notify(&self, event: HotplugEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl SerialTransport for LoopbackTransport {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn list_ports(&self) -> Result<Vec<Arc<dyn PortHandle>>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.listing_fault.lock().clone() {
            return Err(TransportError::Listing { reason });
        }
        let granted = self.granted.lock().clone();
        let devices = self.devices.lock();
        Ok(devices
            .iter()
            .filter(|d| granted.contains(&d.info.path))
            .map(|d| Arc::clone(d) as Arc<dyn PortHandle>)
            .collect())
    }

    async fn request_port(
        &self,
        filters: &[VendorFilter],
    ) -> Result<Arc<dyn PortHandle>, TransportError> {
        let chosen = self
            .devices
            .lock()
            .iter()
            .find(|d| VendorFilter::matches_any(filters, &d.info))
            .cloned()
            .ok_or(TransportError::SelectionCancelled)?;
        let mut granted = self.granted.lock();
        if !granted.contains(&chosen.info.path) {
            granted.push(chosen.info.path.clone());
        }
        Ok(chosen)
    }

    fn watch_hotplug(&self) -> flume::Receiver<HotplugEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_echo_back_to_the_reader() {
        let port = LoopbackPort::new(PortInfo::new("loop0"));
        port.open(115200).await.expect("open");
        let mut reader = port.reader().expect("reader");
        {
            let mut writer = port.writer().expect("writer");
            writer.write(b"ping\n").await.expect("write");
        }
        let chunk = reader.read().await.expect("read");
        assert_eq!(chunk.as_deref(), Some(&b"ping\n"[..]));
        assert_eq!(port.written(), b"ping\n");
        assert_eq!(port.baud_rate(), Some(115200));
    }

    #[tokio::test]
    async fn second_reader_is_refused_until_the_first_is_dropped() {
        let port = LoopbackPort::new(PortInfo::new("loop0"));
        port.open(9600).await.expect("open");
        let first = port.reader().expect("reader");
        assert!(matches!(
            port.reader().err(),
            Some(TransportError::Locked { .. })
        ));
        drop(first);
        assert_eq!(port.reader_releases(), 1);
        assert!(port.reader().is_ok());
    }

    #[tokio::test]
    async fn request_port_respects_vendor_filter_and_grants_access() {
        let transport = LoopbackTransport::new();
        transport.add_device(LoopbackPort::new(PortInfo::usb("cp210x", 0x10c4, 0xea60)));
        transport.add_device(LoopbackPort::new(PortInfo::usb("ftdi", 0x0403, 0x6001)));
        assert!(transport.list_ports().await.expect("list").is_empty());

        let filters = [VendorFilter::new(0x0403, "FTDI")];
        let port = transport.request_port(&filters).await.expect("granted");
        assert_eq!(port.info().path, "ftdi");
        assert_eq!(transport.list_ports().await.expect("list").len(), 1);

        let none = transport
            .request_port(&[VendorFilter::new(0x067b, "Prolific")])
            .await;
        assert!(matches!(none.err(), Some(TransportError::SelectionCancelled)));
    }

    #[tokio::test]
    async fn unplug_ends_the_stream_and_notifies() {
        let transport = LoopbackTransport::new();
        let events = transport.watch_hotplug();
        let port = LoopbackPort::new(PortInfo::new("loop0"));
        transport.plug(Arc::clone(&port));
        port.open(9600).await.expect("open");
        let mut reader = port.reader().expect("reader");

        transport.unplug("loop0");
        assert_eq!(reader.read().await.expect("read"), None);
        assert!(matches!(events.try_recv(), Ok(HotplugEvent::Connected(_))));
        assert!(matches!(events.try_recv(), Ok(HotplugEvent::Disconnected(_))));
    }
}
