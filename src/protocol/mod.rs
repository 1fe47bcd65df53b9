pub mod codec;
pub mod error;
pub mod loopback;
pub mod native;
pub mod ports;
pub mod transport;

pub use codec::{encode_line, LineEnding, TextDecoder};
pub use error::TransportError;
pub use loopback::{LoopbackPort, LoopbackTransport};
pub use native::NativeTransport;
pub use transport::{
    ByteReader, ByteWriter, HotplugEvent, PortHandle, PortInfo, SerialTransport, StreamLease,
    UsbIds, VendorFilter,
};
