use super::{ensure_remaining, AvtpduControl, ControlPdu, EtherLayer2};
use crate::{
    AdpMessageType, AvtpSubtype, DeserializationBuffer, EntityId, Error, ErrorKind, Result,
    SerializationBuffer, AVDECC_MULTICAST_MAC,
};

/// Entity advertisement, departure or discovery request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Adpdu {
    pub ether2: EtherLayer2,
    pub message_type: AdpMessageType,
    /// Validity of the advertisement, in 2 second units (5 bits).
    pub valid_time: u8,
    pub entity_id: EntityId,
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
}

impl Default for Adpdu {
    fn default() -> Self {
        Self {
            ether2: EtherLayer2::new(AVDECC_MULTICAST_MAC),
            message_type: AdpMessageType::EntityAvailable,
            valid_time: 0,
            entity_id: EntityId::NULL,
            entity_model_id: 0,
            entity_capabilities: 0,
            talker_stream_sources: 0,
            talker_capabilities: 0,
            listener_stream_sinks: 0,
            listener_capabilities: 0,
            controller_capabilities: 0,
            available_index: 0,
            gptp_grandmaster_id: 0,
            gptp_domain_number: 0,
            identify_control_index: 0,
            interface_index: 0,
            association_id: 0,
        }
    }
}

impl Adpdu {
    /// ENTITY_DISCOVER for `entity_id`, or for every entity when it is `EntityId::NULL`.
    pub fn discover(entity_id: EntityId) -> Self {
        Self {
            message_type: AdpMessageType::EntityDiscover,
            entity_id,
            ..Default::default()
        }
    }
}

impl ControlPdu for Adpdu {
    const NAME: &'static str = "ADPDU";
    const LENGTH: usize = 56;

    fn ether2(&self) -> &EtherLayer2 {
        &self.ether2
    }

    fn ether2_mut(&mut self) -> &mut EtherLayer2 {
        &mut self.ether2
    }

    fn control_header(&self) -> AvtpduControl {
        AvtpduControl {
            subtype: AvtpSubtype::Adp,
            stream_valid: false,
            version: 0,
            control_data: u8::from(self.message_type),
            status: self.valid_time,
            control_data_length: Self::LENGTH as u16,
            stream_id: self.entity_id.0,
        }
    }

    fn serialize_body(&self, buffer: &mut SerializationBuffer) {
        buffer
            .pack(self.entity_model_id)
            .pack(self.entity_capabilities)
            .pack(self.talker_stream_sources)
            .pack(self.talker_capabilities)
            .pack(self.listener_stream_sinks)
            .pack(self.listener_capabilities)
            .pack(self.controller_capabilities)
            .pack(self.available_index)
            .pack(self.gptp_grandmaster_id)
            .pack(self.gptp_domain_number)
            .pack_buffer(&[0; 3])
            .pack(self.identify_control_index)
            .pack(self.interface_index)
            .pack(self.association_id)
            .pack(0u32);
    }

    fn deserialize_body(
        ether2: EtherLayer2,
        header: &AvtpduControl,
        buffer: &mut DeserializationBuffer<'_>,
    ) -> Result<Self> {
        let message_type = AdpMessageType::from(header.control_data);
        if let AdpMessageType::Unknown(raw) = message_type {
            return Err(Error {
                kind: ErrorKind::UnsupportedMessageType {
                    subtype: AvtpSubtype::Adp,
                    message_type: raw,
                },
            });
        }
        ensure_remaining(Self::NAME, Self::LENGTH, buffer)?;

        let entity_model_id = buffer.unpack()?;
        let entity_capabilities = buffer.unpack()?;
        let talker_stream_sources = buffer.unpack()?;
        let talker_capabilities = buffer.unpack()?;
        let listener_stream_sinks = buffer.unpack()?;
        let listener_capabilities = buffer.unpack()?;
        let controller_capabilities = buffer.unpack()?;
        let available_index = buffer.unpack()?;
        let gptp_grandmaster_id = buffer.unpack()?;
        let gptp_domain_number = buffer.unpack()?;
        buffer.skip(3)?;
        let identify_control_index = buffer.unpack()?;
        let interface_index = buffer.unpack()?;
        let association_id = buffer.unpack()?;
        buffer.skip(4)?;

        Ok(Self {
            ether2,
            message_type,
            valid_time: header.status,
            entity_id: EntityId(header.stream_id),
            entity_model_id,
            entity_capabilities,
            talker_stream_sources,
            talker_capabilities,
            listener_stream_sinks,
            listener_capabilities,
            controller_capabilities,
            available_index,
            gptp_grandmaster_id,
            gptp_domain_number,
            identify_control_index,
            interface_index,
            association_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MacAddress, Pdu};

    fn advertisement() -> Adpdu {
        Adpdu {
            ether2: EtherLayer2 {
                dest_address: AVDECC_MULTICAST_MAC,
                src_address: MacAddress([0x00, 0x1b, 0x92, 0x00, 0x00, 0x01]),
            },
            message_type: AdpMessageType::EntityAvailable,
            valid_time: 31,
            entity_id: EntityId(0x001b_92ff_fe00_0001),
            entity_model_id: 0x001b_9200_0000_0042,
            entity_capabilities: 0x0000_0508,
            talker_stream_sources: 2,
            talker_capabilities: 0x4001,
            listener_stream_sinks: 4,
            listener_capabilities: 0x4001,
            controller_capabilities: 1,
            available_index: 0xFFFF_FFFF,
            gptp_grandmaster_id: 0x0011_22ff_fe33_4455,
            gptp_domain_number: 0,
            identify_control_index: 7,
            interface_index: 1,
            association_id: 0x0102_0304_0506_0708,
        }
    }

    #[test]
    fn round_trip() {
        let pdu = advertisement();
        let frame = pdu.serialize_frame();
        assert_eq!(
            frame.len(),
            EtherLayer2::LENGTH + AvtpduControl::LENGTH + Adpdu::LENGTH
        );
        assert_eq!(Pdu::deserialize(&frame).unwrap(), Pdu::Adp(pdu));
    }

    #[test]
    fn body_is_fixed_length() {
        let mut buffer = SerializationBuffer::new();
        advertisement().serialize_body(&mut buffer);
        assert_eq!(buffer.len(), Adpdu::LENGTH);
        assert_eq!(
            advertisement().control_header().control_data_length,
            Adpdu::LENGTH as u16
        );
    }

    #[test]
    fn valid_time_and_entity_id_live_in_the_control_header() {
        let frame = advertisement().serialize_frame();
        // status field: 31 << 11 | 56
        assert_eq!(&frame[16..18], &[0xF8, 0x38]);
        assert_eq!(&frame[18..26], &0x001b_92ff_fe00_0001u64.to_be_bytes());
    }

    #[test]
    fn truncated_bodies_are_rejected() {
        let frame = advertisement().serialize_frame();
        let header_length = EtherLayer2::LENGTH + AvtpduControl::LENGTH;
        for length in 0..Adpdu::LENGTH {
            match Pdu::deserialize(&frame[..header_length + length]) {
                Err(Error {
                    kind: ErrorKind::InsufficientData { pdu: "ADPDU", .. },
                }) => {}
                other => panic!("length {}: unexpected {:?}", length, other),
            }
        }
    }

    #[test]
    fn discover_targets_the_multicast_group() {
        let pdu = Adpdu::discover(EntityId::NULL);
        assert_eq!(pdu.message_type, AdpMessageType::EntityDiscover);
        assert_eq!(pdu.ether2.dest_address, AVDECC_MULTICAST_MAC);
    }
}
