use crate::{
    AvtpSubtype, DeserializationBuffer, Error, ErrorKind, Result, SerializationBuffer,
};

/// AVTP control header shared by ADP, AECP and ACMP.
///
/// ```text
///  subtype (8) | sv (1) version (3) control_data (4) | status (5) control_data_length (11)
///  stream_id (64)
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AvtpduControl {
    pub subtype: AvtpSubtype,
    pub stream_valid: bool,
    pub version: u8,
    /// The message type of the control PDU.
    pub control_data: u8,
    pub status: u8,
    pub control_data_length: u16,
    pub stream_id: u64,
}

impl AvtpduControl {
    pub const LENGTH: usize = 12;

    pub fn serialize(&self, buffer: &mut SerializationBuffer) {
        let flags = (u8::from(self.stream_valid) << 7)
            | ((self.version & 0x07) << 4)
            | (self.control_data & 0x0F);
        let status_length =
            (u16::from(self.status & 0x1F) << 11) | (self.control_data_length & 0x07FF);

        buffer
            .pack(u8::from(self.subtype))
            .pack(flags)
            .pack(status_length)
            .pack(self.stream_id);
    }

    pub fn deserialize(buffer: &mut DeserializationBuffer<'_>) -> Result<Self> {
        if buffer.remaining() < Self::LENGTH {
            return Err(Error {
                kind: ErrorKind::InsufficientData {
                    pdu: "AvtpduControl",
                    needed: Self::LENGTH,
                    remaining: buffer.remaining(),
                },
            });
        }

        let subtype: u8 = buffer.unpack()?;
        let flags: u8 = buffer.unpack()?;
        let status_length: u16 = buffer.unpack()?;
        let stream_id = buffer.unpack()?;

        Ok(Self {
            subtype: AvtpSubtype::from(subtype),
            stream_valid: flags & 0x80 != 0,
            version: (flags >> 4) & 0x07,
            control_data: flags & 0x0F,
            status: (status_length >> 11) as u8,
            control_data_length: status_length & 0x07FF,
            stream_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_layout() {
        let header = AvtpduControl {
            subtype: AvtpSubtype::Acmp,
            stream_valid: true,
            version: 0,
            control_data: 6,
            status: 0x1F,
            control_data_length: 44,
            stream_id: 0x0102_0304_0506_0708,
        };

        let mut buffer = SerializationBuffer::new();
        header.serialize(&mut buffer);
        assert_eq!(
            buffer.as_slice(),
            &[0xFC, 0x86, 0xF8, 0x2C, 1, 2, 3, 4, 5, 6, 7, 8]
        );

        let decoded =
            AvtpduControl::deserialize(&mut DeserializationBuffer::new(buffer.as_slice()))
                .unwrap();
        assert_eq!(decoded, header);
    }
}
