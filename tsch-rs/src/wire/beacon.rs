//! Enhanced beacon
//!
//! The beacon is what scanning nodes look for: it carries the ASN of the slot it was sent in.

use byte::{check_len, BytesExt, TryRead, TryWrite};

use super::{FrameType, ShortAddress};
use crate::asn::Asn;

/// Enhanced beacon, a fixed 11 byte structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Beacon {
    /// Who sent the beacon
    pub source: ShortAddress,
    /// Sender controlled counter, opaque to the MAC
    pub sync_counter: u8,
    /// Routing rank of the sender
    pub rank: u8,
    /// The slot the beacon was sent in. Only the lower four bytes are on the air,
    /// the high byte is always read as zero.
    pub asn: Asn,
    /// Opaque information for the upper layer
    pub payload_info: u8,
}

impl Beacon {
    pub const LENGTH: usize = 11;

    /// Where the ASN bytes start
    const ASN_OFFSET: usize = 6;

    /// Overwrite the ASN of an already serialized beacon
    pub fn write_asn(bytes: &mut [u8], asn: &Asn) -> byte::Result<()> {
        check_len(bytes, Self::LENGTH)?;
        let [b0, b1, b2, b3, _] = asn.to_bytes();
        bytes[Self::ASN_OFFSET..Self::ASN_OFFSET + 4].copy_from_slice(&[b0, b1, b2, b3]);
        Ok(())
    }

    /// The five ASN bytes as received, with the high byte zeroed
    pub fn asn_bytes(&self) -> [u8; 5] {
        let [b0, b1, b2, b3, _] = self.asn.to_bytes();
        [b0, b1, b2, b3, 0]
    }
}

impl TryRead<'_> for Beacon {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        check_len(bytes, Self::LENGTH)?;

        if bytes.read::<FrameType>(offset)? != FrameType::Beacon {
            return Err(byte::Error::BadInput {
                err: "not a beacon",
            });
        }

        let source = bytes.read(offset)?;
        let sync_counter = bytes.read(offset)?;
        let rank = bytes.read(offset)?;
        let mut asn = [0u8; 5];
        for byte in &mut asn[..4] {
            *byte = bytes.read(offset)?;
        }
        let payload_info = bytes.read(offset)?;

        Ok((
            Self {
                source,
                sync_counter,
                rank,
                asn: Asn::from_bytes(asn),
                payload_info,
            },
            *offset,
        ))
    }
}

impl TryWrite for Beacon {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        check_len(bytes, Self::LENGTH)?;
        bytes.write(offset, FrameType::Beacon)?;
        bytes.write(offset, self.source)?;
        bytes.write(offset, self.sync_counter)?;
        bytes.write(offset, self.rank)?;
        for byte in &self.asn.to_bytes()[..4] {
            bytes.write(offset, *byte)?;
        }
        bytes.write(offset, self.payload_info)?;
        Ok(*offset)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn decode_beacon() {
        let data = [0x0b, 0xeb, 0x01, 0x00, 0x07, 0x02, 0x05, 0x00, 0x01, 0x00, 0x33];
        let mut len = 0usize;
        let beacon: Beacon = data.read(&mut len).unwrap();
        assert_eq!(len, data.len());

        assert_eq!(beacon.source, ShortAddress(1));
        assert_eq!(beacon.sync_counter, 7);
        assert_eq!(beacon.rank, 2);
        assert_eq!(beacon.asn, Asn::from_u64(0x0001_0005));
        assert_eq!(beacon.payload_info, 0x33);
        assert_eq!(beacon.asn_bytes(), [0x05, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn encode_beacon() {
        let beacon = Beacon {
            source: ShortAddress(0x0203),
            sync_counter: 1,
            rank: 0,
            asn: Asn::from_u64(0x09_1234_5678),
            payload_info: 0xaa,
        };

        let mut buffer = [0u8; 32];
        let len = beacon.try_write(&mut buffer, ()).unwrap();

        assert_eq!(
            &buffer[..len],
            &[0x0b, 0xeb, 0x03, 0x02, 0x01, 0x00, 0x78, 0x56, 0x34, 0x12, 0xaa]
        );
    }

    #[test]
    fn patch_asn() {
        let mut buffer = [0u8; Beacon::LENGTH];
        Beacon {
            source: ShortAddress(4),
            sync_counter: 0,
            rank: 1,
            asn: Asn::ZERO,
            payload_info: 0,
        }
        .try_write(&mut buffer, ())
        .unwrap();

        Beacon::write_asn(&mut buffer, &Asn::from_u64(0xdead_beef)).unwrap();
        let beacon = Beacon::try_read(&buffer, ()).unwrap().0;
        assert_eq!(beacon.asn, Asn::from_u64(0xdead_beef));
        assert_eq!(beacon.source, ShortAddress(4));

        assert!(Beacon::write_asn(&mut buffer[..10], &Asn::ZERO).is_err());
    }

    #[test]
    fn rejects_data_frames() {
        let data = [0x7a, 0xda, 0x01, 0x00, 0x07, 0x02, 0x05, 0x00, 0x01, 0x00, 0x33];
        assert!(Beacon::try_read(&data, ()).is_err());
    }
}
