use std::io;
use std::thread;

use pcap::{Active, Capture};
use tokio::sync::mpsc;

use super::{find_interface, is_avtp_frame, FrameReceiver, Transport};
use crate::{Error, ErrorKind, MacAddress, Result};

const READ_TIMEOUT_MS: i32 = 100;
const CAPTURE_FILTER: &str = "ether proto 0x22f0 or (vlan and ether proto 0x22f0)";

fn open_capture(name: &str) -> Result<Capture<Active>> {
    let open_error = |err: pcap::Error| Error {
        kind: ErrorKind::InterfaceOpenError(format!("{}: {}", name, err)),
    };

    Capture::from_device(name)
        .map_err(open_error)?
        .promisc(true)
        .immediate_mode(true)
        .timeout(READ_TIMEOUT_MS)
        .open()
        .map_err(open_error)
}

/// libpcap capture on one interface. Frames are received on a dedicated capture handle and sent
/// on another.
pub struct PcapTransport {
    name: String,
    mac_address: MacAddress,
    capture: Capture<Active>,
}

impl PcapTransport {
    pub fn open(name: &str) -> Result<(Self, FrameReceiver)> {
        let (_, mac_address) = find_interface(name)?;

        let capture = open_capture(name)?;
        let mut receiving = open_capture(name)?;
        receiving
            .filter(CAPTURE_FILTER, true)
            .map_err(|err| Error {
                kind: ErrorKind::InterfaceOpenError(format!("{}: {}", name, err)),
            })?;

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let thread_name = name.to_string();
        thread::spawn(move || {
            loop {
                match receiving.next_packet() {
                    Ok(packet) => {
                        if is_avtp_frame(packet.data) && frames_tx.send(packet.data.to_vec()).is_err()
                        {
                            break;
                        }
                    }
                    Err(pcap::Error::TimeoutExpired) => {
                        if frames_tx.is_closed() {
                            break;
                        }
                    }
                    Err(err) => {
                        error!("{}: capture failed: {}", thread_name, err);
                        break;
                    }
                }
            }
            debug!("{}: capture thread finished", thread_name);
        });

        info!("opened pcap interface {} ({})", name, mac_address);
        let transport = Self {
            name: name.to_string(),
            mac_address,
            capture,
        };
        Ok((transport, frames_rx))
    }
}

impl Transport for PcapTransport {
    fn interface_name(&self) -> &str {
        &self.name
    }

    fn mac_address(&self) -> MacAddress {
        self.mac_address
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.capture.sendpacket(frame).map_err(|err| Error {
            kind: ErrorKind::Io(io::Error::new(io::ErrorKind::Other, err.to_string())),
        })
    }
}
