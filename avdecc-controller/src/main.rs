#[macro_use]
extern crate log;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use avdecc::{
    entity_capabilities, Config, DiscoveredEntity, EntityId, Event, LocalEntityInfo,
    ProtocolInterface, ProtocolInterfaceType,
};
use futures::StreamExt;

const DEFAULT_CONTROLLER_ID: EntityId = EntityId(0x0200_00ff_fe00_0001);

fn parse_kind(kind: &str) -> Result<ProtocolInterfaceType> {
    match kind {
        "pcap" => Ok(ProtocolInterfaceType::PCap),
        "native" => Ok(ProtocolInterfaceType::Native),
        other => bail!("unknown interface type {:?}, expected pcap or native", other),
    }
}

fn parse_entity_id(value: &str) -> Result<EntityId> {
    let digits = value.trim_start_matches("0x");
    let id = u64::from_str_radix(digits, 16)
        .with_context(|| format!("invalid entity ID {:?}", value))?;
    Ok(EntityId(id))
}

fn describe(entity: &DiscoveredEntity) -> String {
    format!(
        "{} at {}, model {:016x}, {} sources, {} sinks",
        entity.entity_id,
        entity.mac_address,
        entity.entity_model_id,
        entity.talker_stream_sources,
        entity.listener_stream_sinks
    )
}

/// Checks that a new entity answers AEM commands and asks it for notifications.
async fn enumerate(interface: Arc<ProtocolInterface>, entity: DiscoveredEntity) {
    let entity_id = entity.entity_id;
    if entity.entity_capabilities & entity_capabilities::AEM_SUPPORTED == 0 {
        debug!("{} does not support AEM", entity_id);
        return;
    }

    if let Err(error) = interface.query_entity_available(entity_id).await {
        warn!("{}: ENTITY_AVAILABLE failed: {}", entity_id, error);
        return;
    }
    match interface.register_unsolicited_notifications(entity_id).await {
        Ok(()) => info!("{}: registered for notifications", entity_id),
        Err(error) => warn!("{}: registration failed: {}", entity_id, error),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();

    let args = std::env::args().collect::<Vec<_>>();
    if args.len() < 3 {
        bail!(
            "usage: {} <pcap|native> <interface> [controller entity ID]",
            args[0]
        );
    }
    let kind = parse_kind(&args[1])?;
    let entity_id = match args.get(3) {
        Some(value) => parse_entity_id(value)?,
        None => DEFAULT_CONTROLLER_ID,
    };

    let config = Config {
        entity: LocalEntityInfo {
            entity_id,
            ..Default::default()
        },
        ..Default::default()
    };
    let interface = ProtocolInterface::open(kind, &args[2], config)
        .with_context(|| format!("opening {} interface {}", kind, args[2]))?;
    let interface = Arc::new(interface);
    info!(
        "controller {} on {} ({})",
        entity_id,
        interface.interface_name(),
        interface.mac_address()
    );

    let mut events = interface.subscribe();
    interface.discover_remote_entities()?;

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Event::EntityOnline(entity)) => {
                    info!("online: {}", describe(&entity));
                    tokio::spawn(enumerate(interface.clone(), entity));
                }
                Some(Event::EntityUpdated(entity)) => info!("updated: {}", describe(&entity)),
                Some(Event::EntityOffline(entity_id)) => info!("offline: {}", entity_id),
                Some(Event::UnsolicitedNotification(notification)) => info!(
                    "{} from {}",
                    notification.command_type,
                    notification.header.target_entity_id
                ),
                Some(Event::AcmpResponseSniffed(response)) => info!(
                    "{:?} ({:?}): {} -> {}",
                    response.message_type,
                    response.status,
                    response.talker_stream(),
                    response.listener_stream()
                ),
                Some(Event::TransportError(error)) => bail!("transport failed: {}", error),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                interface.shutdown().await?;
                break;
            }
        }
    }

    Ok(())
}
