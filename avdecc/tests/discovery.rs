mod common;

use std::time::Duration;

use avdecc::{
    AdpMessageType, Adpdu, Config, EntityId, Error, ErrorKind, Event, LocalEntityInfo, MacAddress,
    ProtocolInterface, ProtocolInterfaceType, VirtualNetwork,
};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{self, timeout, Instant};

use common::*;

#[tokio::test(start_paused = true)]
async fn entity_expires_exactly_once() {
    let (_network, interface, mut peer) = controller_and_peer().await;
    let mut events = subscribe(&interface).await;

    let start = Instant::now();
    peer.advertise(PEER, 2, 0);
    match events.recv().await {
        Some(Event::EntityOnline(entity)) => {
            assert_eq!(entity.entity_id, PEER);
            assert_eq!(entity.mac_address, PEER_MAC);
            assert_eq!(entity.valid_time, 2);
        }
        other => panic!("unexpected {:?}", other),
    }

    match events.recv().await {
        Some(Event::EntityOffline(PEER)) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(start.elapsed(), Duration::from_secs(4));

    assert!(timeout(Duration::from_secs(60), events.recv()).await.is_err());
    assert!(interface.discovered_entities().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn readvertising_postpones_expiry() {
    let (_network, interface, mut peer) = controller_and_peer().await;
    let mut events = subscribe(&interface).await;

    let start = Instant::now();
    peer.advertise(PEER, 2, 0);
    assert!(matches!(events.recv().await, Some(Event::EntityOnline(_))));

    time::sleep(Duration::from_secs(3)).await;
    peer.advertise(PEER, 2, 1);
    settle(&interface).await;

    time::sleep(Duration::from_secs(3)).await;
    assert_eq!(interface.discovered_entities().await.unwrap().len(), 1);

    match events.recv().await {
        Some(Event::EntityOffline(PEER)) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(start.elapsed(), Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn departing_and_rebooting_entities() {
    let (_network, interface, mut peer) = controller_and_peer().await;
    let mut events = subscribe(&interface).await;

    peer.advertise(PEER, 31, 5);
    peer.advertise(PEER, 31, 0);
    peer.send(Adpdu {
        message_type: AdpMessageType::EntityDeparting,
        entity_id: PEER,
        ..Default::default()
    });

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(events.next().await.unwrap());
    }
    match seen.as_slice() {
        [Event::EntityOnline(first), Event::EntityOffline(PEER), Event::EntityOnline(rebooted), Event::EntityOffline(PEER)] =>
        {
            assert_eq!(first.available_index, 5);
            assert_eq!(rebooted.available_index, 0);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(interface.discovered_entities().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn changed_capabilities_are_reported() {
    let (_network, interface, mut peer) = controller_and_peer().await;
    let mut events = subscribe(&interface).await;

    peer.advertise(PEER, 31, 0);
    peer.send(Adpdu {
        entity_id: PEER,
        valid_time: 31,
        available_index: 1,
        gptp_grandmaster_id: 0x0011_22ff_fe33_4455,
        ..Default::default()
    });
    peer.advertise(PEER, 31, 2);

    assert!(matches!(events.recv().await, Some(Event::EntityOnline(_))));
    match events.recv().await {
        Some(Event::EntityUpdated(entity)) => {
            assert_eq!(entity.gptp_grandmaster_id, 0x0011_22ff_fe33_4455)
        }
        other => panic!("unexpected {:?}", other),
    }
    // Back to the original grandmaster.
    assert!(matches!(events.recv().await, Some(Event::EntityUpdated(_))));
}

#[tokio::test(start_paused = true)]
async fn advertises_the_local_entity() {
    init_logging();
    let network = VirtualNetwork::new();
    network.add_interface("entity", CONTROLLER_MAC);
    let (transport, frames) = network.open("entity").unwrap();
    let mut peer = Peer::open(&network, "peer", PEER_MAC);

    let config = Config {
        entity: LocalEntityInfo {
            entity_id: CONTROLLER,
            valid_time: 4,
            ..Default::default()
        },
        advertise: true,
        ..Default::default()
    };
    let interface = ProtocolInterface::new(transport, frames, config);

    let first = peer.recv_adp().await;
    let start = Instant::now();
    assert_eq!(first.message_type, AdpMessageType::EntityAvailable);
    assert_eq!(first.entity_id, CONTROLLER);
    assert_eq!(first.valid_time, 4);
    assert_eq!(first.available_index, 0);
    assert_eq!(first.ether2.src_address, CONTROLLER_MAC);

    let second = peer.recv_adp().await;
    assert_eq!(second.available_index, 1);
    assert_eq!(start.elapsed(), Duration::from_secs(4));

    peer.send(Adpdu::discover(EntityId::NULL));
    let answer = peer.recv_adp().await;
    assert_eq!(answer.message_type, AdpMessageType::EntityAvailable);
    assert_eq!(answer.available_index, 2);
    assert_eq!(start.elapsed(), Duration::from_secs(4));

    interface.shutdown().await.unwrap();
    let departing = peer.recv_adp().await;
    assert_eq!(departing.message_type, AdpMessageType::EntityDeparting);
    assert_eq!(departing.entity_id, CONTROLLER);
}

#[tokio::test(start_paused = true)]
async fn sends_discovery_requests() {
    let (_network, interface, mut peer) = controller_and_peer().await;

    interface.discover_remote_entities().unwrap();
    interface.discover_remote_entity(PEER).unwrap();

    let everyone = peer.recv_adp().await;
    assert_eq!(everyone.message_type, AdpMessageType::EntityDiscover);
    assert_eq!(everyone.entity_id, EntityId::NULL);
    assert_eq!(everyone.ether2.dest_address, avdecc::AVDECC_MULTICAST_MAC);

    let targeted = peer.recv_adp().await;
    assert_eq!(targeted.entity_id, PEER);
}

#[tokio::test(start_paused = true)]
async fn callbacks_follow_entities() {
    let (_network, interface, mut peer) = controller_and_peer().await;

    let (discovered_tx, mut discovered) = mpsc::unbounded_channel();
    let (departed_tx, mut departed) = mpsc::unbounded_channel();
    interface.on_entity_discovered(move |entity| {
        let _ = discovered_tx.send(entity.entity_id);
    });
    interface.on_entity_departed(move |entity_id| {
        let _ = departed_tx.send(entity_id);
    });
    settle(&interface).await;

    peer.advertise(PEER, 1, 0);
    assert_eq!(discovered.recv().await, Some(PEER));
    assert_eq!(departed.recv().await, Some(PEER));

    interface.shutdown().await.unwrap();
    assert_eq!(discovered.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn event_reader_ends_on_shutdown() {
    let (_network, interface, _peer) = controller_and_peer().await;
    let mut events = subscribe(&interface).await;

    interface.shutdown().await.unwrap();
    assert!(events.recv().await.is_none());
    match interface.discovered_entities().await {
        Err(Error {
            kind: ErrorKind::ChannelError,
        }) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn interfaces_that_cannot_be_opened() {
    let network = VirtualNetwork::new();
    network.add_interface("zero", MacAddress::ZERO);
    network.add_interface("veth0", MacAddress([0x02, 0, 0, 0, 0, 0x10]));

    let error = |result: avdecc::Result<_>| match result {
        Err(Error { kind }) => kind,
        Ok(_) => panic!("interface opened"),
    };

    assert!(matches!(
        error(network.open("missing").map(|_| ())),
        ErrorKind::InterfaceNotFound(name) if name == "missing"
    ));
    assert!(matches!(
        error(network.open("zero").map(|_| ())),
        ErrorKind::InterfaceInvalid(_)
    ));

    let opened = network.open("veth0").unwrap();
    assert!(matches!(
        error(network.open("veth0").map(|_| ())),
        ErrorKind::InterfaceOpenError(_)
    ));
    drop(opened);
    assert!(network.open("veth0").is_ok());

    let proxy = ProtocolInterface::open(ProtocolInterfaceType::Proxy, "eth0", Config::default());
    assert!(matches!(
        error(proxy.map(|_| ())),
        ErrorKind::UnsupportedProtocolInterfaceType(ProtocolInterfaceType::Proxy)
    ));
}
