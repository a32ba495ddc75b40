use std::io;
use std::thread;
use std::time::Duration;

use pnet_datalink::{Channel, DataLinkSender};
use tokio::sync::mpsc;

use super::{find_interface, is_avtp_frame, FrameReceiver, Transport};
use crate::{Error, ErrorKind, MacAddress, Result};

const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Raw layer 2 socket opened through pnet_datalink.
pub struct NativeTransport {
    name: String,
    mac_address: MacAddress,
    sender: Box<dyn DataLinkSender>,
}

impl NativeTransport {
    pub fn open(name: &str) -> Result<(Self, FrameReceiver)> {
        let (interface, mac_address) = find_interface(name)?;

        let config = pnet_datalink::Config {
            read_timeout: Some(READ_TIMEOUT),
            ..Default::default()
        };
        let (sender, mut receiver) = match pnet_datalink::channel(&interface, config) {
            Ok(Channel::Ethernet(sender, receiver)) => (sender, receiver),
            Ok(_) => {
                return Err(Error {
                    kind: ErrorKind::InterfaceOpenError(format!(
                        "{}: unsupported channel type",
                        name
                    )),
                })
            }
            Err(err) => {
                return Err(Error {
                    kind: ErrorKind::InterfaceOpenError(format!("{}: {}", name, err)),
                })
            }
        };

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let thread_name = name.to_string();
        thread::spawn(move || {
            loop {
                match receiver.next() {
                    Ok(frame) => {
                        if is_avtp_frame(frame) && frames_tx.send(frame.to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                        if frames_tx.is_closed() {
                            break;
                        }
                    }
                    Err(err) => {
                        error!("{}: receive failed: {}", thread_name, err);
                        break;
                    }
                }
            }
            debug!("{}: receive thread finished", thread_name);
        });

        info!("opened native interface {} ({})", name, mac_address);
        let transport = Self {
            name: name.to_string(),
            mac_address,
            sender,
        };
        Ok((transport, frames_rx))
    }
}

impl Transport for NativeTransport {
    fn interface_name(&self) -> &str {
        &self.name
    }

    fn mac_address(&self) -> MacAddress {
        self.mac_address
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        match self.sender.send_to(frame, None) {
            Some(result) => Ok(result?),
            None => Err(Error {
                kind: ErrorKind::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "insufficient buffer space",
                )),
            }),
        }
    }
}
