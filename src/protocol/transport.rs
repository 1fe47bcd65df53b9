use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use super::error::TransportError;

/// USB descriptor fields reported for a port, when the OS knows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbIds {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// Descriptive information about a serial device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub path: String,
    pub usb: Option<UsbIds>,
}

impl PortInfo {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            usb: None,
        }
    }

    pub fn usb(path: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            path: path.into(),
            usb: Some(UsbIds {
                vendor_id,
                product_id,
                serial_number: None,
                manufacturer: None,
                product: None,
            }),
        }
    }

    pub fn vendor_id(&self) -> Option<u16> {
        self.usb.as_ref().map(|u| u.vendor_id)
    }
}

/// One entry of the vendor allow-list used when requesting a new port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorFilter {
    pub vendor_id: u16,
    #[serde(default)]
    pub label: String,
}

impl VendorFilter {
    pub fn new(vendor_id: u16, label: impl Into<String>) -> Self {
        Self {
            vendor_id,
            label: label.into(),
        }
    }

    /// An empty filter list accepts every port.
    pub fn matches_any(filters: &[VendorFilter], info: &PortInfo) -> bool {
        filters.is_empty()
            || info
                .vendor_id()
                .is_some_and(|vid| filters.iter().any(|f| f.vendor_id == vid))
    }
}

/// Device arrival / removal notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    Connected(PortInfo),
    Disconnected(PortInfo),
}

/// The platform capability used to find and obtain serial ports.
#[async_trait]
pub trait SerialTransport: Send + Sync {
    /// Whether serial access exists at all on this platform.
    fn is_available(&self) -> bool;

    /// Ports the user already has access to.
    async fn list_ports(&self) -> Result<Vec<Arc<dyn PortHandle>>, TransportError>;

    /// Ask for a new port, restricted to the given vendors.
    async fn request_port(
        &self,
        filters: &[VendorFilter],
    ) -> Result<Arc<dyn PortHandle>, TransportError>;

    /// Subscribe to hot-plug notifications. Each call creates a new subscription.
    fn watch_hotplug(&self) -> flume::Receiver<HotplugEvent>;
}

/// A serial device that can be opened, read and written.
#[async_trait]
pub trait PortHandle: Send + Sync {
    fn info(&self) -> PortInfo;

    fn is_open(&self) -> bool;

    async fn open(&self, baud_rate: u32) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    /// Take the read side. Fails with `Locked` while another reader is alive;
    /// dropping the returned reader releases the lock.
    fn reader(&self) -> Result<Box<dyn ByteReader>, TransportError>;

    /// Take the write side, same locking rules as `reader`.
    fn writer(&self) -> Result<Box<dyn ByteWriter>, TransportError>;
}

#[async_trait]
pub trait ByteReader: Send {
    /// Next chunk of bytes, or `Ok(None)` once the stream has ended.
    async fn read(&mut self) -> Result<Option<Bytes>, TransportError>;
}

#[async_trait]
pub trait ByteWriter: Send {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

/// Exclusive lock on one direction of a port, released on drop.
#[derive(Debug)]
pub struct StreamLease {
    flag: Arc<AtomicBool>,
}

impl StreamLease {
    pub fn acquire(
        flag: &Arc<AtomicBool>,
        port: &str,
        direction: &str,
    ) -> Result<Self, TransportError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TransportError::Locked {
                port: port.to_string(),
                direction: direction.to_string(),
            })?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn lease_is_exclusive_until_dropped() {
        let flag = Arc::new(AtomicBool::new(false));
        let first = assert_ok!(StreamLease::acquire(&flag, "COM3", "read"));
        let second = assert_err!(StreamLease::acquire(&flag, "COM3", "read"));
        assert!(matches!(second, TransportError::Locked { .. }));
        drop(first);
        assert_ok!(StreamLease::acquire(&flag, "COM3", "write"));
        assert_ok!(StreamLease::acquire(&flag, "COM3", "read"));
    }

    #[test]
    fn vendor_filter_matching() {
        let filters = vec![VendorFilter::new(0x2341, "Arduino")];
        assert!(VendorFilter::matches_any(
            &filters,
            &PortInfo::usb("/dev/ttyACM0", 0x2341, 0x0043)
        ));
        assert!(!VendorFilter::matches_any(
            &filters,
            &PortInfo::usb("/dev/ttyUSB0", 0x10c4, 0xea60)
        ));
        assert!(!VendorFilter::matches_any(&filters, &PortInfo::new("/dev/ttyS0")));
        assert!(VendorFilter::matches_any(&[], &PortInfo::new("/dev/ttyS0")));
    }
}
