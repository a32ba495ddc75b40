use std::fmt::{self, Display};

use crate::{
    AcmpStatus, AecpMessageType, AemStatus, AvtpSubtype, EntityId, ProtocolInterfaceType,
    StreamIdentification,
};

#[derive(Debug)]
pub enum ErrorKind {
    BufferUnderflow {
        needed: usize,
        remaining: usize,
    },
    InsufficientData {
        pdu: &'static str,
        needed: usize,
        remaining: usize,
    },
    UnsupportedEtherType(u16),
    UnsupportedSubtype(u8),
    UnsupportedMessageType {
        subtype: AvtpSubtype,
        message_type: u8,
    },
    InvalidControlDataLength {
        pdu: &'static str,
        length: u16,
    },
    PayloadTooLarge {
        length: usize,
        maximum: usize,
    },
    InterfaceNotFound(String),
    InterfaceInvalid(String),
    InterfaceOpenError(String),
    UnsupportedProtocolInterfaceType(ProtocolInterfaceType),
    Timeout,
    Cancelled,
    UnknownEntity(EntityId),
    AemStatus(AemStatus),
    AcmpStatus(AcmpStatus),
    AlreadyConnected {
        listener: StreamIdentification,
        talker: StreamIdentification,
    },
    NotConnected(StreamIdentification),
    SequenceIdsExhausted(EntityId),
    UnexpectedResponse(AecpMessageType),
    Io(std::io::Error),
    ChannelError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::BufferUnderflow { needed, remaining } => write!(
                f,
                "buffer underflow: needed {} bytes, {} remaining",
                needed, remaining
            ),
            ErrorKind::InsufficientData {
                pdu,
                needed,
                remaining,
            } => write!(
                f,
                "not enough data to deserialize {}: needed {} bytes, {} remaining",
                pdu, needed, remaining
            ),
            ErrorKind::UnsupportedEtherType(ether_type) => {
                write!(f, "unsupported EtherType: {:#06x}", ether_type)
            }
            ErrorKind::UnsupportedSubtype(subtype) => {
                write!(f, "unsupported AVTP subtype: {:#04x}", subtype)
            }
            ErrorKind::UnsupportedMessageType {
                subtype,
                message_type,
            } => write!(
                f,
                "unsupported message type {} for subtype {}",
                message_type, subtype
            ),
            ErrorKind::InvalidControlDataLength { pdu, length } => {
                write!(f, "invalid control data length for {}: {}", pdu, length)
            }
            ErrorKind::PayloadTooLarge { length, maximum } => write!(
                f,
                "payload too large: {} bytes, maximum is {}",
                length, maximum
            ),
            ErrorKind::InterfaceNotFound(name) => write!(f, "interface not found: {}", name),
            ErrorKind::InterfaceInvalid(name) => write!(f, "interface invalid: {}", name),
            ErrorKind::InterfaceOpenError(reason) => {
                write!(f, "failed to open interface: {}", reason)
            }
            ErrorKind::UnsupportedProtocolInterfaceType(kind) => {
                write!(f, "unsupported protocol interface type: {}", kind)
            }
            ErrorKind::Timeout => write!(f, "timed out waiting for response"),
            ErrorKind::Cancelled => write!(f, "command cancelled"),
            ErrorKind::UnknownEntity(entity_id) => write!(f, "unknown entity: {}", entity_id),
            ErrorKind::AemStatus(status) => write!(f, "AEM status: {}", status),
            ErrorKind::AcmpStatus(status) => write!(f, "ACMP status: {}", status),
            ErrorKind::AlreadyConnected { listener, talker } => write!(
                f,
                "listener stream {} already connected to talker stream {}",
                listener, talker
            ),
            ErrorKind::NotConnected(stream) => write!(f, "stream not connected: {}", stream),
            ErrorKind::SequenceIdsExhausted(entity_id) => {
                write!(f, "no free sequence ID for entity {}", entity_id)
            }
            ErrorKind::UnexpectedResponse(message_type) => {
                write!(f, "unexpected response message type: {}", message_type)
            }
            ErrorKind::Io(error) => write!(f, "IO error: {}", error),
            ErrorKind::ChannelError => write!(f, "channel error"),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "avdecc error: {}", self.kind)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(other: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io(other),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
