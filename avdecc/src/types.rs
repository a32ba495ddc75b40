use std::fmt::{self, Debug, Display};
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{ReadWire, Result, WriteWire};

pub type SequenceId = u16;
pub type StreamIndex = u16;

/// 64-bit identifier of an AVDECC entity.
#[derive(Copy, Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityId(pub u64);

impl EntityId {
    pub const NULL: EntityId = EntityId(0);
    pub const UNINITIALIZED: EntityId = EntityId(0xFFFF_FFFF_FFFF_FFFF);

    pub fn is_valid(self) -> bool {
        self != Self::NULL && self != Self::UNINITIALIZED
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({:#018x})", self.0)
    }
}

impl ReadWire for EntityId {
    const WIRE_LEN: usize = 8;

    fn read_wire<R>(r: &mut R) -> Result<Self>
    where
        R: Read,
    {
        Ok(EntityId(r.read_u64::<BigEndian>()?))
    }
}

impl WriteWire for EntityId {
    fn wire_len(&self) -> usize {
        8
    }

    fn write_wire<W>(self, w: &mut W) -> Result<()>
    where
        W: Write,
    {
        w.write_u64::<BigEndian>(self.0)?;
        Ok(())
    }
}

#[derive(Copy, Clone, Default, Eq, Hash, PartialEq)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const ZERO: MacAddress = MacAddress([0; 6]);
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = slice.try_into().ok()?;
        Some(MacAddress(bytes))
    }
}

impl Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl ReadWire for MacAddress {
    const WIRE_LEN: usize = 6;

    fn read_wire<R>(r: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let mut bytes = [0; 6];
        r.read_exact(&mut bytes)?;
        Ok(MacAddress(bytes))
    }
}

impl WriteWire for MacAddress {
    fn wire_len(&self) -> usize {
        6
    }

    fn write_wire<W>(self, w: &mut W) -> Result<()>
    where
        W: Write,
    {
        w.write_all(&self.0)?;
        Ok(())
    }
}

/// A talker stream output or listener stream input of an entity.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StreamIdentification {
    pub entity_id: EntityId,
    pub stream_index: StreamIndex,
}

impl StreamIdentification {
    pub fn new(entity_id: EntityId, stream_index: StreamIndex) -> Self {
        Self {
            entity_id,
            stream_index,
        }
    }
}

impl Display for StreamIdentification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_id, self.stream_index)
    }
}

/// Entity capability bits advertised in ADP.
pub mod entity_capabilities {
    pub const EFU_MODE: u32 = 0x0000_0001;
    pub const ADDRESS_ACCESS_SUPPORTED: u32 = 0x0000_0002;
    pub const GATEWAY_ENTITY: u32 = 0x0000_0004;
    pub const AEM_SUPPORTED: u32 = 0x0000_0008;
    pub const LEGACY_AVC: u32 = 0x0000_0010;
    pub const ASSOCIATION_ID_SUPPORTED: u32 = 0x0000_0020;
    pub const ASSOCIATION_ID_VALID: u32 = 0x0000_0040;
    pub const VENDOR_UNIQUE_SUPPORTED: u32 = 0x0000_0080;
    pub const CLASS_A_SUPPORTED: u32 = 0x0000_0100;
    pub const CLASS_B_SUPPORTED: u32 = 0x0000_0200;
    pub const GPTP_SUPPORTED: u32 = 0x0000_0400;
}

pub mod talker_capabilities {
    pub const IMPLEMENTED: u16 = 0x0001;
    pub const OTHER_SOURCE: u16 = 0x0200;
    pub const CONTROL_SOURCE: u16 = 0x0400;
    pub const MEDIA_CLOCK_SOURCE: u16 = 0x0800;
    pub const SMPTE_SOURCE: u16 = 0x1000;
    pub const MIDI_SOURCE: u16 = 0x2000;
    pub const AUDIO_SOURCE: u16 = 0x4000;
    pub const VIDEO_SOURCE: u16 = 0x8000;
}

pub mod listener_capabilities {
    pub const IMPLEMENTED: u16 = 0x0001;
    pub const OTHER_SINK: u16 = 0x0200;
    pub const CONTROL_SINK: u16 = 0x0400;
    pub const MEDIA_CLOCK_SINK: u16 = 0x0800;
    pub const SMPTE_SINK: u16 = 0x1000;
    pub const MIDI_SINK: u16 = 0x2000;
    pub const AUDIO_SINK: u16 = 0x4000;
    pub const VIDEO_SINK: u16 = 0x8000;
}

pub mod controller_capabilities {
    pub const IMPLEMENTED: u32 = 0x0000_0001;
}

/// ACMP connection flags.
pub mod acmp_flags {
    pub const CLASS_B: u16 = 0x0001;
    pub const FAST_CONNECT: u16 = 0x0002;
    pub const SAVED_STATE: u16 = 0x0004;
    pub const STREAMING_WAIT: u16 = 0x0008;
    pub const SUPPORTS_ENCRYPTED: u16 = 0x0010;
    pub const ENCRYPTED_PDU: u16 = 0x0020;
    pub const TALKER_FAILED: u16 = 0x0040;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_display_and_multicast() {
        let mac = MacAddress([0x91, 0xe0, 0xf0, 0x01, 0x00, 0x00]);
        assert_eq!(mac.to_string(), "91:e0:f0:01:00:00");
        assert!(mac.is_multicast());
        assert!(!MacAddress([0x00, 0x1b, 0x92, 0x00, 0x00, 0x01]).is_multicast());
        assert!(MacAddress::from_slice(&[1, 2, 3]).is_none());
    }

    #[test]
    fn entity_id_validity() {
        assert!(!EntityId::NULL.is_valid());
        assert!(!EntityId::UNINITIALIZED.is_valid());
        assert!(EntityId(0x001b_92ff_fe01_0203).is_valid());
        assert_eq!(EntityId(0x1).to_string(), "0x0000000000000001");
    }
}
