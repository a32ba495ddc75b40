use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::{validate_mac_address, FrameReceiver, FrameSender, Transport};
use crate::{Error, ErrorKind, MacAddress, Result};

struct Port {
    mac_address: MacAddress,
    /// Present while a transport has the port open.
    sender: Option<FrameSender>,
}

/// An in-process Ethernet segment connecting any number of named virtual interfaces.
///
/// Clones share the same segment.
#[derive(Clone, Default)]
pub struct VirtualNetwork {
    ports: Arc<Mutex<HashMap<String, Port>>>,
}

impl VirtualNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interface. Registering an existing name replaces its MAC address.
    pub fn add_interface<S>(&self, name: S, mac_address: MacAddress)
    where
        S: Into<String>,
    {
        let name = name.into();
        let mut ports = self.ports.lock().expect("poisoned");
        match ports.get_mut(&name) {
            Some(port) => port.mac_address = mac_address,
            None => {
                ports.insert(
                    name,
                    Port {
                        mac_address,
                        sender: None,
                    },
                );
            }
        }
    }

    pub fn open(&self, name: &str) -> Result<(VirtualTransport, FrameReceiver)> {
        let mut ports = self.ports.lock().expect("poisoned");
        let port = ports.get_mut(name).ok_or_else(|| Error {
            kind: ErrorKind::InterfaceNotFound(name.to_string()),
        })?;
        let mac_address = validate_mac_address(name, Some(port.mac_address))?;
        if port.sender.is_some() {
            return Err(Error {
                kind: ErrorKind::InterfaceOpenError(format!("{} is already open", name)),
            });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        port.sender = Some(sender);
        debug!("opened virtual interface {} ({})", name, mac_address);

        let transport = VirtualTransport {
            network: self.clone(),
            name: name.to_string(),
            mac_address,
        };
        Ok((transport, receiver))
    }

    /// Delivers `frame` to every open port other than `from` that it is addressed to.
    fn deliver(&self, from: &str, frame: &[u8]) {
        let dest_address = match frame.get(..6).and_then(MacAddress::from_slice) {
            Some(dest_address) => dest_address,
            None => {
                warn!("{}: dropping runt frame of {} bytes", from, frame.len());
                return;
            }
        };

        let ports = self.ports.lock().expect("poisoned");
        for (name, port) in ports.iter() {
            if name == from || !(dest_address.is_multicast() || port.mac_address == dest_address) {
                continue;
            }
            if let Some(sender) = &port.sender {
                if sender.send(frame.to_vec()).is_err() {
                    trace!("{}: receiver gone, frame not delivered", name);
                }
            }
        }
    }

    fn release(&self, name: &str) {
        if let Some(port) = self.ports.lock().expect("poisoned").get_mut(name) {
            port.sender = None;
        }
    }
}

/// A virtual interface opened from a `VirtualNetwork`. Dropping it closes the port.
pub struct VirtualTransport {
    network: VirtualNetwork,
    name: String,
    mac_address: MacAddress,
}

impl Transport for VirtualTransport {
    fn interface_name(&self) -> &str {
        &self.name
    }

    fn mac_address(&self) -> MacAddress {
        self.mac_address
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.network.deliver(&self.name, frame);
        Ok(())
    }
}

impl Drop for VirtualTransport {
    fn drop(&mut self) {
        debug!("closing virtual interface {}", self.name);
        self.network.release(&self.name);
    }
}
