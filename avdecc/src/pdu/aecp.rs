use super::{ensure_remaining, AvtpduControl, ControlPdu, EtherLayer2};
use crate::{
    AecpMessageType, AemCommandType, AemStatus, AvtpSubtype, DeserializationBuffer, EntityId,
    Error, ErrorKind, Result, SequenceId, SerializationBuffer, AVDECC_MULTICAST_MAC,
};

/// Largest control_data_length an AECPDU may declare.
const MAXIMUM_CONTROL_DATA_LENGTH: usize = 524;

/// Fields common to every AECPDU.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AecpHeader {
    pub message_type: AecpMessageType,
    pub status: AemStatus,
    pub target_entity_id: EntityId,
    pub controller_entity_id: EntityId,
    pub sequence_id: SequenceId,
}

impl AecpHeader {
    /// Bytes following the AVTP control header: controller entity ID and sequence ID.
    pub const LENGTH: usize = 10;

    fn control_header(&self, control_data_length: usize) -> AvtpduControl {
        AvtpduControl {
            subtype: AvtpSubtype::Aecp,
            stream_valid: false,
            version: 0,
            control_data: u8::from(self.message_type),
            status: u8::from(self.status),
            control_data_length: control_data_length as u16,
            stream_id: self.target_entity_id.0,
        }
    }

    fn serialize(&self, buffer: &mut SerializationBuffer) {
        buffer
            .pack(self.controller_entity_id)
            .pack(self.sequence_id);
    }

    fn deserialize(header: &AvtpduControl, buffer: &mut DeserializationBuffer<'_>) -> Result<Self> {
        Ok(Self {
            message_type: AecpMessageType::from(header.control_data),
            status: AemStatus::from(header.status),
            target_entity_id: EntityId(header.stream_id),
            controller_entity_id: buffer.unpack()?,
            sequence_id: buffer.unpack()?,
        })
    }
}

impl Default for AecpHeader {
    fn default() -> Self {
        Self {
            message_type: AecpMessageType::AemCommand,
            status: AemStatus::Success,
            target_entity_id: EntityId::NULL,
            controller_entity_id: EntityId::NULL,
            sequence_id: 0,
        }
    }
}

/// Checks the declared length against the fixed header size and the bytes actually present,
/// returning the payload length.
fn payload_length(
    pdu: &'static str,
    header_length: usize,
    header: &AvtpduControl,
    buffer: &DeserializationBuffer<'_>,
) -> Result<usize> {
    let control_data_length = usize::from(header.control_data_length);
    if !(header_length..=MAXIMUM_CONTROL_DATA_LENGTH).contains(&control_data_length) {
        return Err(Error {
            kind: ErrorKind::InvalidControlDataLength {
                pdu,
                length: header.control_data_length,
            },
        });
    }
    ensure_remaining(pdu, control_data_length, buffer)?;
    Ok(control_data_length - header_length)
}

fn check_payload(payload: &[u8], maximum: usize) -> Result<()> {
    if payload.len() > maximum {
        return Err(Error {
            kind: ErrorKind::PayloadTooLarge {
                length: payload.len(),
                maximum,
            },
        });
    }
    Ok(())
}

/// AEM command or response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AemAecpdu {
    pub ether2: EtherLayer2,
    pub header: AecpHeader,
    pub unsolicited: bool,
    pub command_type: AemCommandType,
    payload: Vec<u8>,
}

impl Default for AemAecpdu {
    fn default() -> Self {
        Self {
            ether2: EtherLayer2::new(AVDECC_MULTICAST_MAC),
            header: AecpHeader::default(),
            unsolicited: false,
            command_type: AemCommandType::EntityAvailable,
            payload: Vec::new(),
        }
    }
}

impl AemAecpdu {
    pub const MAXIMUM_PAYLOAD_LENGTH: usize = MAXIMUM_CONTROL_DATA_LENGTH - Self::LENGTH;

    /// An empty AEM command of the given type.
    pub fn new(command_type: AemCommandType) -> Self {
        Self {
            command_type,
            ..Default::default()
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: Vec<u8>) -> Result<()> {
        check_payload(&payload, Self::MAXIMUM_PAYLOAD_LENGTH)?;
        self.payload = payload;
        Ok(())
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// A response to `command`, addressed back to its sender. The payload is copied so that
    /// responders only need to alter what differs.
    pub fn response_to(command: &AemAecpdu, status: AemStatus) -> Self {
        Self {
            ether2: EtherLayer2::new(command.ether2.src_address),
            header: AecpHeader {
                message_type: AecpMessageType::AemResponse,
                status,
                ..command.header.clone()
            },
            unsolicited: false,
            command_type: command.command_type,
            payload: command.payload.clone(),
        }
    }
}

impl ControlPdu for AemAecpdu {
    const NAME: &'static str = "AEM AECPDU";
    const LENGTH: usize = AecpHeader::LENGTH + 2;

    fn ether2(&self) -> &EtherLayer2 {
        &self.ether2
    }

    fn ether2_mut(&mut self) -> &mut EtherLayer2 {
        &mut self.ether2
    }

    fn control_header(&self) -> AvtpduControl {
        self.header
            .control_header(Self::LENGTH + self.payload.len())
    }

    fn serialize_body(&self, buffer: &mut SerializationBuffer) {
        self.header.serialize(buffer);
        let command_type = u16::from(self.command_type) & 0x7FFF;
        let unsolicited = if self.unsolicited { 0x8000 } else { 0 };
        buffer
            .pack(unsolicited | command_type)
            .pack_buffer(&self.payload);
    }

    fn deserialize_body(
        ether2: EtherLayer2,
        header: &AvtpduControl,
        buffer: &mut DeserializationBuffer<'_>,
    ) -> Result<Self> {
        let payload_length = payload_length(Self::NAME, Self::LENGTH, header, buffer)?;
        let common = AecpHeader::deserialize(header, buffer)?;
        let command_type: u16 = buffer.unpack()?;
        let payload = buffer.unpack_vec(payload_length)?;

        Ok(Self {
            ether2,
            header: common,
            unsolicited: command_type & 0x8000 != 0,
            command_type: AemCommandType::from(command_type & 0x7FFF),
            payload,
        })
    }
}

/// Vendor unique command or response, identified by a 48-bit protocol identifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VuAecpdu {
    pub ether2: EtherLayer2,
    pub header: AecpHeader,
    pub protocol_identifier: [u8; 6],
    payload: Vec<u8>,
}

impl Default for VuAecpdu {
    fn default() -> Self {
        Self {
            ether2: EtherLayer2::new(AVDECC_MULTICAST_MAC),
            header: AecpHeader {
                message_type: AecpMessageType::VendorUniqueCommand,
                ..Default::default()
            },
            protocol_identifier: [0; 6],
            payload: Vec::new(),
        }
    }
}

impl VuAecpdu {
    pub const MAXIMUM_PAYLOAD_LENGTH: usize = MAXIMUM_CONTROL_DATA_LENGTH - Self::LENGTH;

    /// An empty vendor unique command for `protocol_identifier`.
    pub fn new(protocol_identifier: [u8; 6]) -> Self {
        Self {
            protocol_identifier,
            ..Default::default()
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: Vec<u8>) -> Result<()> {
        check_payload(&payload, Self::MAXIMUM_PAYLOAD_LENGTH)?;
        self.payload = payload;
        Ok(())
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn response_to(command: &VuAecpdu, status: AemStatus) -> Self {
        Self {
            ether2: EtherLayer2::new(command.ether2.src_address),
            header: AecpHeader {
                message_type: AecpMessageType::VendorUniqueResponse,
                status,
                ..command.header.clone()
            },
            protocol_identifier: command.protocol_identifier,
            payload: command.payload.clone(),
        }
    }
}

impl ControlPdu for VuAecpdu {
    const NAME: &'static str = "VU AECPDU";
    const LENGTH: usize = AecpHeader::LENGTH + 6;

    fn ether2(&self) -> &EtherLayer2 {
        &self.ether2
    }

    fn ether2_mut(&mut self) -> &mut EtherLayer2 {
        &mut self.ether2
    }

    fn control_header(&self) -> AvtpduControl {
        self.header
            .control_header(Self::LENGTH + self.payload.len())
    }

    fn serialize_body(&self, buffer: &mut SerializationBuffer) {
        self.header.serialize(buffer);
        buffer
            .pack_buffer(&self.protocol_identifier)
            .pack_buffer(&self.payload);
    }

    fn deserialize_body(
        ether2: EtherLayer2,
        header: &AvtpduControl,
        buffer: &mut DeserializationBuffer<'_>,
    ) -> Result<Self> {
        let payload_length = payload_length(Self::NAME, Self::LENGTH, header, buffer)?;
        let common = AecpHeader::deserialize(header, buffer)?;
        let mut protocol_identifier = [0; 6];
        buffer.unpack_buffer(&mut protocol_identifier)?;
        let payload = buffer.unpack_vec(payload_length)?;

        Ok(Self {
            ether2,
            header: common,
            protocol_identifier,
            payload,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Aecpdu {
    Aem(AemAecpdu),
    VendorUnique(VuAecpdu),
}

impl Aecpdu {
    pub fn header(&self) -> &AecpHeader {
        match self {
            Aecpdu::Aem(pdu) => &pdu.header,
            Aecpdu::VendorUnique(pdu) => &pdu.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut AecpHeader {
        match self {
            Aecpdu::Aem(pdu) => &mut pdu.header,
            Aecpdu::VendorUnique(pdu) => &mut pdu.header,
        }
    }
}

impl ControlPdu for Aecpdu {
    const NAME: &'static str = "AECPDU";
    const LENGTH: usize = AecpHeader::LENGTH;

    fn ether2(&self) -> &EtherLayer2 {
        match self {
            Aecpdu::Aem(pdu) => pdu.ether2(),
            Aecpdu::VendorUnique(pdu) => pdu.ether2(),
        }
    }

    fn ether2_mut(&mut self) -> &mut EtherLayer2 {
        match self {
            Aecpdu::Aem(pdu) => pdu.ether2_mut(),
            Aecpdu::VendorUnique(pdu) => pdu.ether2_mut(),
        }
    }

    fn control_header(&self) -> AvtpduControl {
        match self {
            Aecpdu::Aem(pdu) => pdu.control_header(),
            Aecpdu::VendorUnique(pdu) => pdu.control_header(),
        }
    }

    fn serialize_body(&self, buffer: &mut SerializationBuffer) {
        match self {
            Aecpdu::Aem(pdu) => pdu.serialize_body(buffer),
            Aecpdu::VendorUnique(pdu) => pdu.serialize_body(buffer),
        }
    }

    fn deserialize_body(
        ether2: EtherLayer2,
        header: &AvtpduControl,
        buffer: &mut DeserializationBuffer<'_>,
    ) -> Result<Self> {
        match AecpMessageType::from(header.control_data) {
            AecpMessageType::AemCommand | AecpMessageType::AemResponse => Ok(Aecpdu::Aem(
                AemAecpdu::deserialize_body(ether2, header, buffer)?,
            )),
            AecpMessageType::VendorUniqueCommand | AecpMessageType::VendorUniqueResponse => {
                Ok(Aecpdu::VendorUnique(VuAecpdu::deserialize_body(
                    ether2, header, buffer,
                )?))
            }
            _ => Err(Error {
                kind: ErrorKind::UnsupportedMessageType {
                    subtype: AvtpSubtype::Aecp,
                    message_type: header.control_data,
                },
            }),
        }
    }
}
