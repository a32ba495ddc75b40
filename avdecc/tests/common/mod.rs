#![allow(dead_code)]

use std::time::Duration;

use avdecc::{
    Acmpdu, AdpMessageType, Adpdu, Aecpdu, AemAecpdu, Config, EntityId, EventReader,
    FrameReceiver, LocalEntityInfo, MacAddress, Pdu, ProtocolInterface, Transport,
    VirtualNetwork, VirtualTransport,
};

pub const CONTROLLER: EntityId = EntityId(0x0001_0203_0405_0001);
pub const CONTROLLER_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const PEER: EntityId = EntityId(0x0001_0203_0405_0002);
pub const PEER_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

pub fn config(entity_id: EntityId) -> Config {
    Config {
        entity: LocalEntityInfo {
            entity_id,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A hand-driven entity speaking raw PDUs on a virtual network.
pub struct Peer {
    transport: VirtualTransport,
    frames: FrameReceiver,
}

impl Peer {
    pub fn open(network: &VirtualNetwork, name: &str, mac_address: MacAddress) -> Self {
        network.add_interface(name, mac_address);
        let (transport, frames) = network.open(name).unwrap();
        Self { transport, frames }
    }

    pub fn send<P>(&mut self, pdu: P)
    where
        P: Into<Pdu>,
    {
        let mut pdu = pdu.into();
        pdu.ether2_mut().src_address = self.transport.mac_address();
        self.transport.send_frame(&pdu.serialize()).unwrap();
    }

    pub async fn recv_frame(&mut self) -> Vec<u8> {
        self.frames.recv().await.expect("network closed")
    }

    pub async fn recv(&mut self) -> Pdu {
        Pdu::deserialize(&self.recv_frame().await).unwrap()
    }

    pub async fn recv_adp(&mut self) -> Adpdu {
        loop {
            if let Pdu::Adp(pdu) = self.recv().await {
                return pdu;
            }
        }
    }

    pub async fn recv_aem(&mut self) -> AemAecpdu {
        loop {
            if let Pdu::Aecp(Aecpdu::Aem(pdu)) = self.recv().await {
                return pdu;
            }
        }
    }

    pub async fn recv_acmp(&mut self) -> Acmpdu {
        loop {
            if let Pdu::Acmp(pdu) = self.recv().await {
                return pdu;
            }
        }
    }

    /// True if nothing but ADP arrives within `period`.
    pub async fn is_quiet(&mut self, period: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + period;
        loop {
            match tokio::time::timeout_at(deadline, self.recv()).await {
                Ok(Pdu::Adp(_)) => continue,
                Ok(_) => return false,
                Err(_) => return true,
            }
        }
    }

    /// Announces `entity_id` as valid for `valid_time` × 2 seconds.
    pub fn advertise(&mut self, entity_id: EntityId, valid_time: u8, available_index: u32) {
        self.send(Adpdu {
            message_type: AdpMessageType::EntityAvailable,
            entity_id,
            valid_time,
            available_index,
            ..Default::default()
        });
    }
}

/// A controller interface and a peer on a fresh network.
pub async fn controller_and_peer() -> (VirtualNetwork, ProtocolInterface, Peer) {
    init_logging();
    let network = VirtualNetwork::new();
    network.add_interface("controller", CONTROLLER_MAC);
    let (transport, frames) = network.open("controller").unwrap();
    let interface = ProtocolInterface::new(transport, frames, config(CONTROLLER));
    let peer = Peer::open(&network, "peer", PEER_MAC);
    (network, interface, peer)
}

/// Waits until the interface has handled every request and frame sent so far.
pub async fn settle(interface: &ProtocolInterface) {
    interface.discovered_entities().await.unwrap();
}

/// Subscribes, making sure the subscription is in place before returning.
pub async fn subscribe(interface: &ProtocolInterface) -> EventReader {
    let events = interface.subscribe();
    settle(interface).await;
    events
}

/// Makes `PEER` known to the interface.
pub async fn discover_peer(interface: &ProtocolInterface, peer: &mut Peer) {
    peer.advertise(PEER, 31, 0);
    let entities = interface.discovered_entities().await.unwrap();
    assert!(entities.iter().any(|entity| entity.entity_id == PEER));
}
