//! IEEE 1722.1 (AVDECC) discovery, enumeration/control and connection management over raw
//! Ethernet.

mod acmp;
mod adp;
mod aecp;
mod buffer;
mod codes;
mod config;
mod errors;
mod events;
mod interface;
mod pdu;
pub mod transport;
mod types;

#[macro_use]
extern crate log;

pub use avdecc_helpers::RetryPolicy;

pub use crate::acmp::ConnectionInfo;
pub use crate::adp::DiscoveredEntity;
pub use crate::aecp::AemCommandHandler;
pub use crate::buffer::{DeserializationBuffer, ReadWire, SerializationBuffer, WriteWire};
pub use crate::codes::{
    AcmpMessageType, AcmpStatus, AdpMessageType, AecpMessageType, AemCommandType, AemStatus,
    AvtpSubtype,
};
pub use crate::config::{AcmpConfig, AdpConfig, Config, LocalEntityInfo, TalkerStreamConfig};
pub use crate::errors::{Error, ErrorKind, Result};
pub use crate::events::{Event, EventReader};
pub use crate::interface::{AemResponse, ProtocolInterface};
pub use crate::pdu::{
    Acmpdu, Adpdu, AecpHeader, Aecpdu, AemAecpdu, AvtpduControl, ControlPdu, EtherLayer2, Pdu,
    VuAecpdu, AVTP_ETHER_TYPE, MINIMUM_FRAME_LENGTH,
};
pub use crate::transport::{
    FrameReceiver, ProtocolInterfaceType, Transport, VirtualNetwork, VirtualTransport,
};
pub use crate::types::{
    acmp_flags, controller_capabilities, entity_capabilities, listener_capabilities,
    talker_capabilities, EntityId, MacAddress, SequenceId, StreamIdentification, StreamIndex,
};

/// Destination of ADP and ACMP messages (IEEE 1722.1 Annex B).
pub const AVDECC_MULTICAST_MAC: MacAddress = MacAddress([0x91, 0xe0, 0xf0, 0x01, 0x00, 0x00]);
