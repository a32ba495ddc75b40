use super::{ensure_remaining, AvtpduControl, ControlPdu, EtherLayer2};
use crate::{
    AcmpMessageType, AcmpStatus, AvtpSubtype, DeserializationBuffer, EntityId, Error, ErrorKind,
    MacAddress, Result, SequenceId, SerializationBuffer, StreamIdentification,
    AVDECC_MULTICAST_MAC,
};

/// Connection management command or response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Acmpdu {
    pub ether2: EtherLayer2,
    pub message_type: AcmpMessageType,
    pub status: AcmpStatus,
    pub stream_id: u64,
    pub controller_entity_id: EntityId,
    pub talker_entity_id: EntityId,
    pub listener_entity_id: EntityId,
    pub talker_unique_id: u16,
    pub listener_unique_id: u16,
    pub stream_dest_address: MacAddress,
    pub connection_count: u16,
    pub sequence_id: SequenceId,
    pub flags: u16,
    pub stream_vlan_id: u16,
}

impl Default for Acmpdu {
    fn default() -> Self {
        Self {
            ether2: EtherLayer2::new(AVDECC_MULTICAST_MAC),
            message_type: AcmpMessageType::ConnectRxCommand,
            status: AcmpStatus::Success,
            stream_id: 0,
            controller_entity_id: EntityId::NULL,
            talker_entity_id: EntityId::NULL,
            listener_entity_id: EntityId::NULL,
            talker_unique_id: 0,
            listener_unique_id: 0,
            stream_dest_address: MacAddress::ZERO,
            connection_count: 0,
            sequence_id: 0,
            flags: 0,
            stream_vlan_id: 0,
        }
    }
}

impl Acmpdu {
    pub fn talker_stream(&self) -> StreamIdentification {
        StreamIdentification::new(self.talker_entity_id, self.talker_unique_id)
    }

    pub fn listener_stream(&self) -> StreamIdentification {
        StreamIdentification::new(self.listener_entity_id, self.listener_unique_id)
    }

    /// The entity a command of this type is addressed to.
    pub fn target_entity_id(&self) -> EntityId {
        if self.message_type.is_talker_message() {
            self.talker_entity_id
        } else {
            self.listener_entity_id
        }
    }

    /// A response to `command`, keeping every field of the command. ACMP responses are always
    /// sent to the multicast group.
    pub fn response_to(command: &Acmpdu, status: AcmpStatus) -> Self {
        Self {
            ether2: EtherLayer2::new(AVDECC_MULTICAST_MAC),
            message_type: command.message_type.response(),
            status,
            ..command.clone()
        }
    }
}

impl ControlPdu for Acmpdu {
    const NAME: &'static str = "ACMPDU";
    const LENGTH: usize = 44;

    fn ether2(&self) -> &EtherLayer2 {
        &self.ether2
    }

    fn ether2_mut(&mut self) -> &mut EtherLayer2 {
        &mut self.ether2
    }

    fn control_header(&self) -> AvtpduControl {
        AvtpduControl {
            subtype: AvtpSubtype::Acmp,
            stream_valid: false,
            version: 0,
            control_data: u8::from(self.message_type),
            status: u8::from(self.status),
            control_data_length: Self::LENGTH as u16,
            stream_id: self.stream_id,
        }
    }

    fn serialize_body(&self, buffer: &mut SerializationBuffer) {
        buffer
            .pack(self.controller_entity_id)
            .pack(self.talker_entity_id)
            .pack(self.listener_entity_id)
            .pack(self.talker_unique_id)
            .pack(self.listener_unique_id)
            .pack(self.stream_dest_address)
            .pack(self.connection_count)
            .pack(self.sequence_id)
            .pack(self.flags)
            .pack(self.stream_vlan_id)
            .pack(0u16);
    }

    fn deserialize_body(
        ether2: EtherLayer2,
        header: &AvtpduControl,
        buffer: &mut DeserializationBuffer<'_>,
    ) -> Result<Self> {
        let message_type = AcmpMessageType::from(header.control_data);
        if let AcmpMessageType::Unknown(raw) = message_type {
            return Err(Error {
                kind: ErrorKind::UnsupportedMessageType {
                    subtype: AvtpSubtype::Acmp,
                    message_type: raw,
                },
            });
        }
        ensure_remaining(Self::NAME, Self::LENGTH, buffer)?;

        let pdu = Self {
            ether2,
            message_type,
            status: AcmpStatus::from(header.status),
            stream_id: header.stream_id,
            controller_entity_id: buffer.unpack()?,
            talker_entity_id: buffer.unpack()?,
            listener_entity_id: buffer.unpack()?,
            talker_unique_id: buffer.unpack()?,
            listener_unique_id: buffer.unpack()?,
            stream_dest_address: buffer.unpack()?,
            connection_count: buffer.unpack()?,
            sequence_id: buffer.unpack()?,
            flags: buffer.unpack()?,
            stream_vlan_id: buffer.unpack()?,
        };
        buffer.skip(2)?;

        if cfg!(debug_assertions) && buffer.remaining() > 0 {
            trace!(
                "{} bytes trailing ACMPDU {:?}",
                buffer.remaining(),
                pdu.message_type
            );
        }

        Ok(pdu)
    }
}
