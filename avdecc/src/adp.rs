use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::events::{Event, Outbox};
use crate::{AdpMessageType, Adpdu, Config, EntityId, LocalEntityInfo, MacAddress};

/// A remote entity learnt from its ADP advertisements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredEntity {
    pub entity_id: EntityId,
    pub mac_address: MacAddress,
    pub entity_model_id: u64,
    pub entity_capabilities: u32,
    pub talker_stream_sources: u16,
    pub talker_capabilities: u16,
    pub listener_stream_sinks: u16,
    pub listener_capabilities: u16,
    pub controller_capabilities: u32,
    pub available_index: u32,
    pub gptp_grandmaster_id: u64,
    pub gptp_domain_number: u8,
    pub identify_control_index: u16,
    pub interface_index: u16,
    pub association_id: u64,
    /// In 2 second units, as advertised.
    pub valid_time: u8,
    pub last_seen: Instant,
}

impl DiscoveredEntity {
    fn new(pdu: &Adpdu, now: Instant) -> Self {
        Self {
            entity_id: pdu.entity_id,
            mac_address: pdu.ether2.src_address,
            entity_model_id: pdu.entity_model_id,
            entity_capabilities: pdu.entity_capabilities,
            talker_stream_sources: pdu.talker_stream_sources,
            talker_capabilities: pdu.talker_capabilities,
            listener_stream_sinks: pdu.listener_stream_sinks,
            listener_capabilities: pdu.listener_capabilities,
            controller_capabilities: pdu.controller_capabilities,
            available_index: pdu.available_index,
            gptp_grandmaster_id: pdu.gptp_grandmaster_id,
            gptp_domain_number: pdu.gptp_domain_number,
            identify_control_index: pdu.identify_control_index,
            interface_index: pdu.interface_index,
            association_id: pdu.association_id,
            valid_time: pdu.valid_time,
            last_seen: now,
        }
    }

    /// The entity is removed if nothing is heard from it by then. A valid time of zero counts
    /// as one.
    pub fn expires_at(&self) -> Instant {
        let valid_time = self.valid_time.max(1);
        self.last_seen + Duration::from_secs(2 * u64::from(valid_time))
    }

    fn is_updated_by(&self, other: &DiscoveredEntity) -> bool {
        self.entity_capabilities != other.entity_capabilities
            || self.talker_capabilities != other.talker_capabilities
            || self.listener_capabilities != other.listener_capabilities
            || self.controller_capabilities != other.controller_capabilities
            || self.gptp_grandmaster_id != other.gptp_grandmaster_id
            || self.gptp_domain_number != other.gptp_domain_number
    }
}

/// Advertises the local entity.
struct Advertiser {
    info: LocalEntityInfo,
    interval: Duration,
    talker_stream_sources: u16,
    listener_stream_sinks: u16,
    available_index: u32,
    /// Set while advertising.
    next_advertisement: Option<Instant>,
}

impl Advertiser {
    fn adpdu(&self, message_type: AdpMessageType) -> Adpdu {
        let info = &self.info;
        Adpdu {
            message_type,
            valid_time: info.valid_time,
            entity_id: info.entity_id,
            entity_model_id: info.entity_model_id,
            entity_capabilities: info.entity_capabilities,
            talker_stream_sources: self.talker_stream_sources,
            talker_capabilities: info.talker_capabilities,
            listener_stream_sinks: self.listener_stream_sinks,
            listener_capabilities: info.listener_capabilities,
            controller_capabilities: info.controller_capabilities,
            available_index: self.available_index,
            gptp_grandmaster_id: info.gptp_grandmaster_id,
            gptp_domain_number: info.gptp_domain_number,
            identify_control_index: info.identify_control_index,
            interface_index: info.interface_index,
            association_id: info.association_id,
            ..Default::default()
        }
    }

    fn advertise(&mut self, now: Instant, outbox: &mut Outbox) {
        outbox.send(self.adpdu(AdpMessageType::EntityAvailable));
        self.available_index = self.available_index.wrapping_add(1);
        self.next_advertisement = Some(now + self.interval);
    }
}

pub(crate) struct AdpStateMachine {
    advertiser: Advertiser,
    entities: HashMap<EntityId, DiscoveredEntity>,
}

impl AdpStateMachine {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            advertiser: Advertiser {
                info: config.entity.clone(),
                interval: config.adp.advertise_interval(&config.entity),
                talker_stream_sources: config.talker_streams.len() as u16,
                listener_stream_sinks: config.listener_sinks,
                available_index: 0,
                next_advertisement: None,
            },
            entities: HashMap::new(),
        }
    }

    pub(crate) fn local_entity_id(&self) -> EntityId {
        self.advertiser.info.entity_id
    }

    pub(crate) fn is_advertising(&self) -> bool {
        self.advertiser.next_advertisement.is_some()
    }

    pub(crate) fn enable_advertising(&mut self, now: Instant, outbox: &mut Outbox) {
        if self.is_advertising() {
            return;
        }
        info!("advertising entity {}", self.local_entity_id());
        self.advertiser.advertise(now, outbox);
    }

    pub(crate) fn disable_advertising(&mut self, outbox: &mut Outbox) {
        if self.advertiser.next_advertisement.take().is_some() {
            info!("entity {} departing", self.local_entity_id());
            outbox.send(self.advertiser.adpdu(AdpMessageType::EntityDeparting));
        }
    }

    /// Replaces the advertised information, re-advertising straight away if it changed.
    pub(crate) fn set_entity_info(
        &mut self,
        info: LocalEntityInfo,
        now: Instant,
        outbox: &mut Outbox,
    ) {
        self.advertiser.info = info;
        if self.is_advertising() {
            self.advertiser.advertise(now, outbox);
        }
    }

    pub(crate) fn discover(&mut self, entity_id: EntityId, outbox: &mut Outbox) {
        debug!("discovering {}", entity_id);
        outbox.send(Adpdu::discover(entity_id));
    }

    pub(crate) fn entity(&self, entity_id: EntityId) -> Option<&DiscoveredEntity> {
        self.entities.get(&entity_id)
    }

    pub(crate) fn entities(&self) -> Vec<DiscoveredEntity> {
        self.entities.values().cloned().collect()
    }

    pub(crate) fn process(&mut self, pdu: Adpdu, now: Instant, outbox: &mut Outbox) {
        match pdu.message_type {
            AdpMessageType::EntityAvailable => self.process_available(&pdu, now, outbox),
            AdpMessageType::EntityDeparting => {
                if self.entities.remove(&pdu.entity_id).is_some() {
                    info!("entity {} departed", pdu.entity_id);
                    outbox.emit(Event::EntityOffline(pdu.entity_id));
                }
            }
            AdpMessageType::EntityDiscover => {
                let wanted = pdu.entity_id == EntityId::NULL || pdu.entity_id == self.local_entity_id();
                if self.is_advertising() && wanted {
                    debug!("answering ENTITY_DISCOVER from {}", pdu.ether2.src_address);
                    outbox.send(self.advertiser.adpdu(AdpMessageType::EntityAvailable));
                    self.advertiser.available_index =
                        self.advertiser.available_index.wrapping_add(1);
                }
            }
            AdpMessageType::Unknown(raw) => trace!("ignoring ADP message type {}", raw),
        }
    }

    fn process_available(&mut self, pdu: &Adpdu, now: Instant, outbox: &mut Outbox) {
        if pdu.entity_id == self.local_entity_id() {
            warn!(
                "{} advertises our own entity ID {}",
                pdu.ether2.src_address, pdu.entity_id
            );
            return;
        }

        let entity = DiscoveredEntity::new(pdu, now);
        match self.entities.insert(entity.entity_id, entity.clone()) {
            None => {
                info!("entity {} online at {}", entity.entity_id, entity.mac_address);
                outbox.emit(Event::EntityOnline(entity));
            }
            Some(previous) if entity.available_index < previous.available_index => {
                info!("entity {} restarted", entity.entity_id);
                outbox.emit(Event::EntityOffline(entity.entity_id));
                outbox.emit(Event::EntityOnline(entity));
            }
            Some(previous) if previous.is_updated_by(&entity) => {
                debug!("entity {} updated", entity.entity_id);
                outbox.emit(Event::EntityUpdated(entity));
            }
            Some(_) => trace!("entity {} refreshed", entity.entity_id),
        }
    }

    /// Sends the periodic advertisement and removes expired entities.
    pub(crate) fn expire(&mut self, now: Instant, outbox: &mut Outbox) {
        if matches!(self.advertiser.next_advertisement, Some(at) if at <= now) {
            self.advertiser.advertise(now, outbox);
        }

        let mut expired: Vec<(Instant, EntityId)> = self
            .entities
            .values()
            .filter(|entity| entity.expires_at() <= now)
            .map(|entity| (entity.expires_at(), entity.entity_id))
            .collect();
        expired.sort();

        for (_, entity_id) in expired {
            self.entities.remove(&entity_id);
            info!("entity {} timed out", entity_id);
            outbox.emit(Event::EntityOffline(entity_id));
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entities
            .values()
            .map(DiscoveredEntity::expires_at)
            .chain(self.advertiser.next_advertisement)
            .min()
    }
}
