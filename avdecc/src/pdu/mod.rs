mod acmp;
mod adp;
mod aecp;
mod avtp;
mod ethernet;

pub use self::acmp::Acmpdu;
pub use self::adp::Adpdu;
pub use self::aecp::{AecpHeader, Aecpdu, AemAecpdu, VuAecpdu};
pub use self::avtp::AvtpduControl;
pub use self::ethernet::{EtherLayer2, AVTP_ETHER_TYPE, MINIMUM_FRAME_LENGTH};

use crate::{AvtpSubtype, DeserializationBuffer, Error, ErrorKind, Result, SerializationBuffer};

/// An AVTP control PDU: an Ethernet layer, an AVTP control header derived from the PDU's
/// typed fields, then the body.
pub trait ControlPdu: Sized {
    const NAME: &'static str;
    /// Length of the fixed part of the body.
    const LENGTH: usize;

    fn ether2(&self) -> &EtherLayer2;

    fn ether2_mut(&mut self) -> &mut EtherLayer2;

    fn control_header(&self) -> AvtpduControl;

    /// Writes everything that follows the AVTP control header.
    fn serialize_body(&self, buffer: &mut SerializationBuffer);

    fn deserialize_body(
        ether2: EtherLayer2,
        header: &AvtpduControl,
        buffer: &mut DeserializationBuffer<'_>,
    ) -> Result<Self>;

    fn serialize_frame(&self) -> Vec<u8> {
        let header = self.control_header();
        let mut buffer = SerializationBuffer::with_capacity(
            EtherLayer2::LENGTH + AvtpduControl::LENGTH + usize::from(header.control_data_length),
        );
        self.ether2().serialize(&mut buffer);
        header.serialize(&mut buffer);

        let start = buffer.len();
        self.serialize_body(&mut buffer);
        let written = buffer.len() - start;
        if written != usize::from(header.control_data_length) {
            error!(
                "{} serialized {} bytes but declares {}",
                Self::NAME,
                written,
                header.control_data_length
            );
        }

        buffer.pad_to(MINIMUM_FRAME_LENGTH);
        buffer.into_vec()
    }
}

pub(crate) fn ensure_remaining(
    pdu: &'static str,
    needed: usize,
    buffer: &DeserializationBuffer<'_>,
) -> Result<()> {
    let remaining = buffer.remaining();
    if remaining < needed {
        return Err(Error {
            kind: ErrorKind::InsufficientData {
                pdu,
                needed,
                remaining,
            },
        });
    }
    Ok(())
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Pdu {
    Adp(Adpdu),
    Aecp(Aecpdu),
    Acmp(Acmpdu),
}

impl Pdu {
    pub fn ether2(&self) -> &EtherLayer2 {
        match self {
            Pdu::Adp(pdu) => pdu.ether2(),
            Pdu::Aecp(pdu) => pdu.ether2(),
            Pdu::Acmp(pdu) => pdu.ether2(),
        }
    }

    pub fn ether2_mut(&mut self) -> &mut EtherLayer2 {
        match self {
            Pdu::Adp(pdu) => pdu.ether2_mut(),
            Pdu::Aecp(pdu) => pdu.ether2_mut(),
            Pdu::Acmp(pdu) => pdu.ether2_mut(),
        }
    }

    pub fn subtype(&self) -> AvtpSubtype {
        match self {
            Pdu::Adp(_) => AvtpSubtype::Adp,
            Pdu::Aecp(_) => AvtpSubtype::Aecp,
            Pdu::Acmp(_) => AvtpSubtype::Acmp,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Pdu::Adp(pdu) => pdu.serialize_frame(),
            Pdu::Aecp(pdu) => pdu.serialize_frame(),
            Pdu::Acmp(pdu) => pdu.serialize_frame(),
        }
    }

    /// Decodes a complete Ethernet frame.
    pub fn deserialize(frame: &[u8]) -> Result<Self> {
        let mut buffer = DeserializationBuffer::new(frame);
        let ether2 = EtherLayer2::deserialize(&mut buffer)?;
        let header = AvtpduControl::deserialize(&mut buffer)?;

        match header.subtype {
            AvtpSubtype::Adp => Ok(Pdu::Adp(Adpdu::deserialize_body(
                ether2,
                &header,
                &mut buffer,
            )?)),
            AvtpSubtype::Aecp => Ok(Pdu::Aecp(Aecpdu::deserialize_body(
                ether2,
                &header,
                &mut buffer,
            )?)),
            AvtpSubtype::Acmp => Ok(Pdu::Acmp(Acmpdu::deserialize_body(
                ether2,
                &header,
                &mut buffer,
            )?)),
            AvtpSubtype::Unknown(raw) => Err(Error {
                kind: ErrorKind::UnsupportedSubtype(raw),
            }),
        }
    }
}

impl From<Adpdu> for Pdu {
    fn from(pdu: Adpdu) -> Self {
        Pdu::Adp(pdu)
    }
}

impl From<Aecpdu> for Pdu {
    fn from(pdu: Aecpdu) -> Self {
        Pdu::Aecp(pdu)
    }
}

impl From<AemAecpdu> for Pdu {
    fn from(pdu: AemAecpdu) -> Self {
        Pdu::Aecp(Aecpdu::Aem(pdu))
    }
}

impl From<VuAecpdu> for Pdu {
    fn from(pdu: VuAecpdu) -> Self {
        Pdu::Aecp(Aecpdu::VendorUnique(pdu))
    }
}

impl From<Acmpdu> for Pdu {
    fn from(pdu: Acmpdu) -> Self {
        Pdu::Acmp(pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_frames_are_padded() {
        let pdu = AemAecpdu::default();
        let frame = Pdu::from(pdu.clone()).serialize();
        assert_eq!(frame.len(), MINIMUM_FRAME_LENGTH);

        match Pdu::deserialize(&frame).unwrap() {
            Pdu::Aecp(Aecpdu::Aem(decoded)) => assert_eq!(decoded, pdu),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_subtype_is_rejected() {
        let mut frame = Pdu::from(Adpdu::default()).serialize();
        frame[EtherLayer2::LENGTH] = 0x7F;

        match Pdu::deserialize(&frame) {
            Err(Error {
                kind: ErrorKind::UnsupportedSubtype(0x7F),
            }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
