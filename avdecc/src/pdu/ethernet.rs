use super::ensure_remaining;
use crate::{DeserializationBuffer, Error, ErrorKind, MacAddress, Result, SerializationBuffer};

pub const AVTP_ETHER_TYPE: u16 = 0x22F0;
const VLAN_ETHER_TYPE: u16 = 0x8100;
/// Tag control information plus the inner EtherType.
const VLAN_TAG_LENGTH: usize = 4;

/// Smallest Ethernet frame, without the FCS.
pub const MINIMUM_FRAME_LENGTH: usize = 60;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EtherLayer2 {
    pub dest_address: MacAddress,
    pub src_address: MacAddress,
}

impl EtherLayer2 {
    pub const LENGTH: usize = 14;

    pub fn new(dest_address: MacAddress) -> Self {
        Self {
            dest_address,
            src_address: MacAddress::ZERO,
        }
    }

    pub fn serialize(&self, buffer: &mut SerializationBuffer) {
        buffer
            .pack(self.dest_address)
            .pack(self.src_address)
            .pack(AVTP_ETHER_TYPE);
    }

    pub fn deserialize(buffer: &mut DeserializationBuffer<'_>) -> Result<Self> {
        ensure_remaining("EtherLayer2", Self::LENGTH, buffer)?;

        let dest_address = buffer.unpack()?;
        let src_address = buffer.unpack()?;
        let mut ether_type: u16 = buffer.unpack()?;
        if ether_type == VLAN_ETHER_TYPE {
            ensure_remaining("EtherLayer2", VLAN_TAG_LENGTH, buffer)?;
            let _tag_control: u16 = buffer.unpack()?;
            ether_type = buffer.unpack()?;
        }
        if ether_type != AVTP_ETHER_TYPE {
            return Err(Error {
                kind: ErrorKind::UnsupportedEtherType(ether_type),
            });
        }

        Ok(Self {
            dest_address,
            src_address,
        })
    }
}
