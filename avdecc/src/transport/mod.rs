#[cfg(feature = "native")]
mod native;
#[cfg(feature = "pcap")]
mod libpcap;
mod virtual_network;

use std::fmt::{self, Display};

use tokio::sync::mpsc;

use crate::{Error, ErrorKind, MacAddress, Result};

pub use self::virtual_network::{VirtualNetwork, VirtualTransport};

/// Raw Ethernet frames received by a transport.
pub type FrameReceiver = mpsc::UnboundedReceiver<Vec<u8>>;
pub(crate) type FrameSender = mpsc::UnboundedSender<Vec<u8>>;

/// Sending half of a network interface. Received frames are delivered through the
/// `FrameReceiver` handed out when the transport is opened.
pub trait Transport: Send + 'static {
    fn interface_name(&self) -> &str;

    fn mac_address(&self) -> MacAddress;

    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;
}

impl Transport for Box<dyn Transport> {
    fn interface_name(&self) -> &str {
        (**self).interface_name()
    }

    fn mac_address(&self) -> MacAddress {
        (**self).mac_address()
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send_frame(frame)
    }
}

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ProtocolInterfaceType {
    /// libpcap capture and injection.
    PCap,
    /// Raw socket of the operating system.
    Native,
    /// Remote AVDECC proxy server.
    Proxy,
    /// In-process network, see `VirtualNetwork`.
    Virtual,
}

impl ProtocolInterfaceType {
    pub const ALL: [ProtocolInterfaceType; 4] = [
        ProtocolInterfaceType::PCap,
        ProtocolInterfaceType::Native,
        ProtocolInterfaceType::Proxy,
        ProtocolInterfaceType::Virtual,
    ];

    pub fn is_supported(self) -> bool {
        match self {
            ProtocolInterfaceType::PCap => cfg!(feature = "pcap"),
            ProtocolInterfaceType::Native => cfg!(feature = "native"),
            ProtocolInterfaceType::Proxy => false,
            ProtocolInterfaceType::Virtual => true,
        }
    }

    pub fn supported_types() -> Vec<ProtocolInterfaceType> {
        Self::ALL
            .iter()
            .copied()
            .filter(|kind| kind.is_supported())
            .collect()
    }
}

impl Display for ProtocolInterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolInterfaceType::PCap => "PCap",
            ProtocolInterfaceType::Native => "Native",
            ProtocolInterfaceType::Proxy => "Proxy",
            ProtocolInterfaceType::Virtual => "Virtual",
        };
        f.write_str(name)
    }
}

/// Opens the system network interface `name`.
///
/// Virtual interfaces live in a `VirtualNetwork` and are opened from it instead.
pub fn open(kind: ProtocolInterfaceType, name: &str) -> Result<(Box<dyn Transport>, FrameReceiver)> {
    match kind {
        #[cfg(feature = "pcap")]
        ProtocolInterfaceType::PCap => {
            let (transport, frames) = self::libpcap::PcapTransport::open(name)?;
            Ok((Box::new(transport), frames))
        }
        #[cfg(feature = "native")]
        ProtocolInterfaceType::Native => {
            let (transport, frames) = self::native::NativeTransport::open(name)?;
            Ok((Box::new(transport), frames))
        }
        _ => {
            debug!("cannot open {}: {} is not supported", name, kind);
            Err(Error {
                kind: ErrorKind::UnsupportedProtocolInterfaceType(kind),
            })
        }
    }
}

/// Looks up a system interface and its usable MAC address.
#[cfg(any(feature = "native", feature = "pcap"))]
fn find_interface(name: &str) -> Result<(pnet_datalink::NetworkInterface, MacAddress)> {
    let interface = pnet_datalink::interfaces()
        .into_iter()
        .find(|interface| interface.name == name)
        .ok_or_else(|| Error {
            kind: ErrorKind::InterfaceNotFound(name.to_string()),
        })?;
    let mac_address = validate_mac_address(
        name,
        interface
            .mac
            .map(|mac| MacAddress([mac.0, mac.1, mac.2, mac.3, mac.4, mac.5])),
    )?;
    Ok((interface, mac_address))
}

/// True for frames that may carry AVDECC, possibly behind a VLAN tag.
#[cfg(any(feature = "native", feature = "pcap"))]
fn is_avtp_frame(frame: &[u8]) -> bool {
    match frame.get(12..14) {
        Some([0x22, 0xF0]) => true,
        Some([0x81, 0x00]) => matches!(frame.get(16..18), Some([0x22, 0xF0])),
        _ => false,
    }
}

/// Checks the MAC address of an interface about to be opened.
pub(crate) fn validate_mac_address(name: &str, mac: Option<MacAddress>) -> Result<MacAddress> {
    match mac {
        Some(mac) if !mac.is_zero() && !mac.is_multicast() => Ok(mac),
        _ => Err(Error {
            kind: ErrorKind::InterfaceInvalid(name.to_string()),
        }),
    }
}
