use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashSet;

use super::{
    error::TransportError,
    transport::{PortInfo, UsbIds},
};

/// Enumerate the system's serial ports, de-duplicated and in display order.
pub fn available_ports_sorted() -> Result<Vec<PortInfo>, TransportError> {
    let raw_ports = serialport::available_ports().map_err(TransportError::listing)?;
    Ok(sort_and_dedup_ports(
        raw_ports.iter().map(port_info_from).collect(),
    ))
}

pub fn port_info_from(info: &SerialPortInfo) -> PortInfo {
    let usb = match &info.port_type {
        SerialPortType::UsbPort(usb) => Some(UsbIds {
            vendor_id: usb.vid,
            product_id: usb.pid,
            serial_number: usb.serial_number.clone(),
            manufacturer: usb.manufacturer.clone(),
            product: usb.product.clone(),
        }),
        _ => None,
    };
    PortInfo {
        path: info.port_name.clone(),
        usb,
    }
}

pub(crate) fn sort_and_dedup_ports(raw_ports: Vec<PortInfo>) -> Vec<PortInfo> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut ports: Vec<PortInfo> = Vec::new();

    for port in raw_ports {
        // macOS lists every device twice (cu.* and tty.*); the key folds both
        let base = dedup_base(&port.path);
        let key = match &port.usb {
            Some(usb) => format!("{}:vid={:04x}:pid={:04x}", base, usb.vendor_id, usb.product_id),
            None => base,
        };
        if seen.insert(key) {
            ports.push(port);
        }
    }

    ports.sort_by(|a, b| {
        let pa = priority(a);
        let pb = priority(b);
        pa.cmp(&pb).then_with(|| natural_key(&a.path).cmp(&natural_key(&b.path)))
    });

    ports
}

fn dedup_base(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path).to_lowercase();
    match base.strip_prefix("cu.") {
        Some(rest) => format!("tty.{rest}"),
        None => base,
    }
}

// USB adapters first, then CDC-ACM boards, then on-board UARTs
fn priority(port: &PortInfo) -> i32 {
    if port.usb.is_some() {
        return 0;
    }
    name_priority(&port.path.to_lowercase())
}

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        fn name_priority(_name: &str) -> i32 {
            10
        }
    } else {
        fn name_priority(n: &str) -> i32 {
            if n.contains("ttyusb") || n.contains("usbserial") || n.contains("usbmodem") {
                0
            } else if n.contains("acm") {
                1
            } else if n.contains("ttys") || n.contains("serial") {
                2
            } else {
                10
            }
        }
    }
}

/// Split trailing digits so COM10 sorts after COM9.
fn natural_key(name: &str) -> (String, u64) {
    let digits = name.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    let (head, tail) = name.split_at(name.len() - digits);
    (head.to_lowercase(), tail.parse().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usb_ports_come_first_and_numbers_sort_naturally() {
        let input = vec![
            PortInfo::new("/dev/ttyS10"),
            PortInfo::new("/dev/ttyS2"),
            PortInfo::usb("/dev/ttyUSB0", 0x0403, 0x6001),
        ];
        let out = sort_and_dedup_ports(input);
        let names: Vec<_> = out.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(names, vec!["/dev/ttyUSB0", "/dev/ttyS2", "/dev/ttyS10"]);
    }

    #[test]
    fn duplicate_entries_are_collapsed() {
        let input = vec![
            PortInfo::usb("/dev/cu.usbmodem1101", 0x2341, 0x0043),
            PortInfo::usb("/dev/tty.usbmodem1101", 0x2341, 0x0043),
            PortInfo::new("/dev/ttyS0"),
            PortInfo::new("/dev/ttyS0"),
        ];
        let out = sort_and_dedup_ports(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].path, "/dev/cu.usbmodem1101");
    }

    #[test]
    fn same_name_with_different_ids_is_kept() {
        let input = vec![
            PortInfo::usb("COM3", 0x2341, 0x0043),
            PortInfo::usb("COM3", 0x067b, 0x2303),
        ];
        assert_eq!(sort_and_dedup_ports(input).len(), 2);
    }
}
