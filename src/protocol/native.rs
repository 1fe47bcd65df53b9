//! `serialport`-backed transport for real hardware.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serialport::SerialPort;
use std::{
    io::{ErrorKind, Read, Write},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use super::{
    error::TransportError,
    ports::available_ports_sorted,
    transport::{
        ByteReader, ByteWriter, HotplugEvent, PortHandle, PortInfo, SerialTransport,
        StreamLease, VendorFilter,
    },
};

const READ_CHUNK: usize = 256;
const DRAIN_POLL: Duration = Duration::from_millis(5);

type BoxedPort = Box<dyn SerialPort>;

pub struct NativeTransport {
    read_timeout: Duration,
    hotplug_interval: Duration,
}

impl NativeTransport {
    pub fn new(read_timeout: Duration, hotplug_interval: Duration) -> Self {
        Self {
            read_timeout,
            hotplug_interval,
        }
    }

    fn handle_for(&self, info: PortInfo) -> Arc<dyn PortHandle> {
        Arc::new(NativePort::new(info, self.read_timeout))
    }
}

#[async_trait]
impl SerialTransport for NativeTransport {
    fn is_available(&self) -> bool {
        cfg!(any(unix, windows))
    }

    async fn list_ports(&self) -> Result<Vec<Arc<dyn PortHandle>>, TransportError> {
        let ports = tokio::task::spawn_blocking(available_ports_sorted)
            .await
            .map_err(TransportError::listing)??;
        Ok(ports.into_iter().map(|p| self.handle_for(p)).collect())
    }

    async fn request_port(
        &self,
        filters: &[VendorFilter],
    ) -> Result<Arc<dyn PortHandle>, TransportError> {
        // There is no system picker here; the first device matching the allow-list wins.
        let ports = tokio::task::spawn_blocking(available_ports_sorted)
            .await
            .map_err(TransportError::listing)??;
        let chosen = ports
            .into_iter()
            .find(|p| p.usb.is_some() && VendorFilter::matches_any(filters, p))
            .ok_or(TransportError::SelectionCancelled)?;
        log::info!("request_port: picked {}", chosen.path);
        Ok(self.handle_for(chosen))
    }

    fn watch_hotplug(&self) -> flume::Receiver<HotplugEvent> {
        let (tx, rx) = flume::unbounded();
        let interval = self.hotplug_interval;
        let spawned = thread::Builder::new()
            .name("serterm-hotplug".to_string())
            .spawn(move || {
                let mut known = available_ports_sorted().unwrap_or_default();
                loop {
                    thread::sleep(interval);
                    if tx.is_disconnected() {
                        log::debug!("hotplug watcher: receiver gone, stopping");
                        return;
                    }
                    let current = match available_ports_sorted() {
                        Ok(ports) => ports,
                        Err(err) => {
                            log::warn!("hotplug watcher: enumeration failed: {err}");
                            continue;
                        }
                    };
                    for port in current.iter().filter(|p| !contains_path(&known, p)) {
                        let _ = tx.send(HotplugEvent::Connected(port.clone()));
                    }
                    for port in known.iter().filter(|p| !contains_path(&current, p)) {
                        let _ = tx.send(HotplugEvent::Disconnected(port.clone()));
                    }
                    known = current;
                }
            });
        if let Err(err) = spawned {
            log::error!("failed to start hotplug watcher: {err}");
        }
        rx
    }
}

fn contains_path(ports: &[PortInfo], port: &PortInfo) -> bool {
    ports.iter().any(|p| p.path == port.path)
}

/// Counts blocking reads that still hold a cloned handle.
///
/// A read cancelled by the session keeps running on the blocking pool until
/// its timeout expires, and the device stays busy until that clone is gone.
#[derive(Debug, Clone, Default)]
struct ReadsInFlight(Arc<AtomicUsize>);

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ReadsInFlight {
    fn enter(&self) -> InFlightGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(&self.0))
    }

    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Wait until no read is in flight. Returns false if `limit` ran out first.
    async fn drained(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, async {
            while self.count() > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        })
        .await
        .is_ok()
    }
}

pub struct NativePort {
    info: PortInfo,
    read_timeout: Duration,
    serial: Mutex<Option<BoxedPort>>,
    reader_flag: Arc<AtomicBool>,
    writer_flag: Arc<AtomicBool>,
    reads: ReadsInFlight,
}

impl NativePort {
    pub fn new(info: PortInfo, read_timeout: Duration) -> Self {
        Self {
            info,
            read_timeout,
            serial: Mutex::new(None),
            reader_flag: Arc::new(AtomicBool::new(false)),
            writer_flag: Arc::new(AtomicBool::new(false)),
            reads: ReadsInFlight::default(),
        }
    }

    fn clone_open(&self) -> Result<BoxedPort, TransportError> {
        let guard = self.serial.lock();
        let serial = guard.as_ref().ok_or_else(|| TransportError::NotOpen {
            port: self.info.path.clone(),
        })?;
        serial
            .try_clone()
            .map_err(|err| TransportError::read(format!("{}: {err}", self.info.path)))
    }
}

fn open_error(port: &str, err: serialport::Error) -> TransportError {
    match err.kind() {
        serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => TransportError::PermissionDenied {
            port: port.to_string(),
        },
        _ => TransportError::Open {
            port: port.to_string(),
            reason: err.to_string(),
        },
    }
}

#[async_trait]
impl PortHandle for NativePort {
    fn info(&self) -> PortInfo {
        self.info.clone()
    }

    fn is_open(&self) -> bool {
        self.serial.lock().is_some()
    }

    async fn open(&self, baud_rate: u32) -> Result<(), TransportError> {
        if self.is_open() {
            return Err(TransportError::Open {
                port: self.info.path.clone(),
                reason: "already open".to_string(),
            });
        }
        let path = self.info.path.clone();
        let timeout = self.read_timeout;
        let opened = tokio::task::spawn_blocking(move || {
            serialport::new(path, baud_rate).timeout(timeout).open()
        })
        .await
        .map_err(|err| TransportError::Open {
            port: self.info.path.clone(),
            reason: err.to_string(),
        })?
        .map_err(|err| open_error(&self.info.path, err))?;

        log::info!("opened {} at {} baud", self.info.path, baud_rate);
        *self.serial.lock() = Some(opened);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let serial = self.serial.lock().take();
        match serial {
            // Dropping the last handle closes the file descriptor
            Some(serial) => {
                drop(serial);
                let limit = self.read_timeout * 2 + DRAIN_POLL * 10;
                if !self.reads.drained(limit).await {
                    log::warn!(
                        "{}: {} read(s) still pending after close",
                        self.info.path,
                        self.reads.count()
                    );
                }
                log::info!("closed {}", self.info.path);
                Ok(())
            }
            None => Err(TransportError::NotOpen {
                port: self.info.path.clone(),
            }),
        }
    }

    fn reader(&self) -> Result<Box<dyn ByteReader>, TransportError> {
        let lease = StreamLease::acquire(&self.reader_flag, &self.info.path, "read")?;
        let serial = self.clone_open()?;
        Ok(Box::new(NativeReader {
            serial: Some(serial),
            reads: self.reads.clone(),
            _lease: lease,
        }))
    }

    fn writer(&self) -> Result<Box<dyn ByteWriter>, TransportError> {
        let lease = StreamLease::acquire(&self.writer_flag, &self.info.path, "write")?;
        let serial = self.clone_open()?;
        Ok(Box::new(NativeWriter {
            serial: Some(serial),
            _lease: lease,
        }))
    }
}

struct NativeReader {
    serial: Option<BoxedPort>,
    reads: ReadsInFlight,
    _lease: StreamLease,
}

#[async_trait]
impl ByteReader for NativeReader {
    async fn read(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            // A read cancelled mid-flight leaves the clone inside the blocking task
            let mut serial = self
                .serial
                .take()
                .ok_or_else(|| TransportError::read("reader was interrupted"))?;
            let busy = self.reads.enter();
            // The guard is returned last so it drops after the clone
            let (serial, result, _busy) = tokio::task::spawn_blocking(move || {
                let mut buf = vec![0u8; READ_CHUNK];
                let result = serial.read(&mut buf).map(|n| {
                    buf.truncate(n);
                    buf
                });
                (serial, result, busy)
            })
            .await
            .map_err(TransportError::read)?;
            self.serial = Some(serial);

            match result {
                Ok(buf) if buf.is_empty() => {}
                Ok(buf) => return Ok(Some(Bytes::from(buf))),
                Err(err) if err.kind() == ErrorKind::TimedOut => {}
                Err(err) if err.kind() == ErrorKind::BrokenPipe => return Ok(None),
                Err(err) => return Err(TransportError::read(err)),
            }
        }
    }
}

struct NativeWriter {
    serial: Option<BoxedPort>,
    _lease: StreamLease,
}

#[async_trait]
impl ByteWriter for NativeWriter {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut serial = self
            .serial
            .take()
            .ok_or_else(|| TransportError::write("writer was interrupted"))?;
        let payload = data.to_vec();
        let (serial, result) = tokio::task::spawn_blocking(move || {
            let result = serial.write_all(&payload).and_then(|_| serial.flush());
            (serial, result)
        })
        .await
        .map_err(TransportError::write)?;
        self.serial = Some(serial);
        result.map_err(TransportError::write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opening_a_missing_device_fails_cleanly() {
        let port = NativePort::new(
            PortInfo::new("/dev/serterm_missing_port"),
            Duration::from_millis(10),
        );
        let err = port.open(9600).await.expect_err("missing device must not open");
        assert!(matches!(
            err,
            TransportError::Open { .. } | TransportError::PermissionDenied { .. }
        ));
        assert!(!port.is_open());
    }

    #[tokio::test]
    async fn close_waits_for_a_detached_blocking_read() {
        let reads = ReadsInFlight::default();
        let busy = reads.enter();
        let pending = tokio::task::spawn_blocking(move || {
            thread::sleep(Duration::from_millis(50));
            drop(busy);
        });
        drop(pending);

        assert_eq!(reads.count(), 1);
        assert!(!reads.drained(Duration::from_millis(5)).await);
        assert!(reads.drained(Duration::from_secs(2)).await);
        assert_eq!(reads.count(), 0);
    }

    #[tokio::test]
    async fn leases_require_an_open_port() {
        let port = NativePort::new(PortInfo::new("COM250"), Duration::from_millis(10));
        assert!(matches!(
            port.reader().err(),
            Some(TransportError::NotOpen { .. })
        ));
        // The failed attempt must not leave the read side locked
        assert!(matches!(
            port.reader().err(),
            Some(TransportError::NotOpen { .. })
        ));
        assert!(matches!(
            port.close().await,
            Err(TransportError::NotOpen { .. })
        ));
    }
}
