//! Absolute slot number bookkeeping

use core::fmt::Display;

/// Offset of a slot within the repeating slotframe
pub type SlotOffset = u16;

/// The absolute slot number: the number of slots since the network started.
///
/// It is kept as the three words it is compared and serialized in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Asn {
    pub bytes0and1: u16,
    pub bytes2and3: u16,
    pub byte4: u8,
}

impl Asn {
    pub const ZERO: Self = Self {
        bytes0and1: 0,
        bytes2and3: 0,
        byte4: 0,
    };

    /// Reads the five byte little endian wire form
    pub const fn from_bytes(bytes: [u8; 5]) -> Self {
        Self {
            bytes0and1: u16::from_le_bytes([bytes[0], bytes[1]]),
            bytes2and3: u16::from_le_bytes([bytes[2], bytes[3]]),
            byte4: bytes[4],
        }
    }

    /// The five byte little endian wire form
    pub const fn to_bytes(self) -> [u8; 5] {
        let [b0, b1] = self.bytes0and1.to_le_bytes();
        let [b2, b3] = self.bytes2and3.to_le_bytes();
        [b0, b1, b2, b3, self.byte4]
    }

    pub const fn from_u64(value: u64) -> Self {
        Self {
            bytes0and1: value as u16,
            bytes2and3: (value >> 16) as u16,
            byte4: (value >> 32) as u8,
        }
    }

    pub const fn as_u64(&self) -> u64 {
        (self.byte4 as u64) << 32 | (self.bytes2and3 as u64) << 16 | self.bytes0and1 as u64
    }

    /// Increments by one slot, carrying between the words
    pub fn increment(&mut self) {
        self.bytes0and1 = self.bytes0and1.wrapping_add(1);
        if self.bytes0and1 == 0 {
            self.bytes2and3 = self.bytes2and3.wrapping_add(1);
            if self.bytes2and3 == 0 {
                self.byte4 = self.byte4.wrapping_add(1);
            }
        }
    }

    /// The number of slots elapsed since `earlier`.
    ///
    /// This is only meant for short horizons: `None` is returned when the high bytes differ,
    /// when the mid words are more than one apart or when `earlier` is in fact later.
    pub fn difference(&self, earlier: &Asn) -> Option<u32> {
        if self.byte4 != earlier.byte4 {
            return None;
        }

        let (now, then) = (self.bytes0and1 as u32, earlier.bytes0and1 as u32);

        if self.bytes2and3 == earlier.bytes2and3 {
            now.checked_sub(then)
        } else if self.bytes2and3.checked_sub(earlier.bytes2and3) == Some(1) {
            Some(now + 0xffff - then + 1)
        } else {
            None
        }
    }
}

impl Display for Asn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#012x}", self.as_u64())
    }
}

/// The ASN together with everything derived from it.
///
/// Besides the slot offset, it tracks the phase within both hopping sequences.
/// Those are counted separately because beacon and data cells hop on
/// sequences of different lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct AsnLedger {
    asn: Asn,
    slot_offset: SlotOffset,
    data_hop_offset: u8,
    beacon_hop_offset: u8,
    slotframe_length: u16,
    data_sequence_length: u8,
    beacon_sequence_length: u8,
}

impl AsnLedger {
    /// Create a ledger at ASN 0. All lengths must be non-zero.
    pub fn new(
        slotframe_length: u16,
        data_sequence_length: u8,
        beacon_sequence_length: u8,
    ) -> Self {
        Self {
            asn: Asn::ZERO,
            slot_offset: 0,
            data_hop_offset: 0,
            beacon_hop_offset: 0,
            slotframe_length: slotframe_length.max(1),
            data_sequence_length: data_sequence_length.max(1),
            beacon_sequence_length: beacon_sequence_length.max(1),
        }
    }

    pub fn asn(&self) -> Asn {
        self.asn
    }

    pub fn slot_offset(&self) -> SlotOffset {
        self.slot_offset
    }

    pub fn data_hop_offset(&self) -> u8 {
        self.data_hop_offset
    }

    pub fn beacon_hop_offset(&self) -> u8 {
        self.beacon_hop_offset
    }

    pub fn slotframe_length(&self) -> u16 {
        self.slotframe_length
    }

    /// Move on to the next slot
    pub fn advance(&mut self) {
        self.asn.increment();
        self.slot_offset = (self.slot_offset + 1) % self.slotframe_length;
        self.data_hop_offset = (self.data_hop_offset + 1) % self.data_sequence_length;
        self.beacon_hop_offset = (self.beacon_hop_offset + 1) % self.beacon_sequence_length;
    }

    /// Adopt the network's ASN as learned from a beacon.
    ///
    /// This is the only way the ASN can move other than one step forward.
    pub fn sync_from_beacon(&mut self, asn: [u8; 5]) {
        self.asn = Asn::from_bytes(asn);
        self.recompute();
    }

    /// The ASN in its wire format
    pub fn serialize(&self) -> [u8; 5] {
        self.asn.to_bytes()
    }

    /// Override the beacon hopping phase with the one observed on the air
    pub fn adopt_beacon_phase(&mut self, beacon_hop_offset: u8) {
        self.beacon_hop_offset = beacon_hop_offset % self.beacon_sequence_length;
    }

    fn recompute(&mut self) {
        let asn = self.asn.as_u64();
        self.slot_offset = (asn % self.slotframe_length as u64) as SlotOffset;
        self.data_hop_offset = (asn % self.data_sequence_length as u64) as u8;
        self.beacon_hop_offset = (asn % self.beacon_sequence_length as u64) as u8;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn low_word_rolls_over_once() {
        for start in [
            Asn::ZERO,
            Asn::from_u64(0x12_3456_0000),
            Asn::from_u64(0x00_fffe_0000),
        ] {
            let mut asn = start;
            for _ in 0..(1 << 16) {
                asn.increment();
            }

            assert_eq!(asn.bytes0and1, start.bytes0and1);
            assert_eq!(asn.bytes2and3, start.bytes2and3 + 1);
            assert_eq!(asn.byte4, start.byte4);
            assert_eq!(asn.as_u64(), start.as_u64() + (1 << 16));
        }
    }

    #[test]
    fn carries_into_high_byte() {
        let mut asn = Asn::from_u64(0x00_ffff_ffff);
        asn.increment();
        assert_eq!(asn, Asn::from_u64(0x01_0000_0000));
    }

    #[test]
    fn beacon_round_trip() {
        let mut ledger = AsnLedger::new(101, 16, 3);
        for bytes in [[5, 0, 0, 0, 0], [0xff, 0x12, 0x34, 0x56, 0x78], [0; 5]] {
            ledger.sync_from_beacon(bytes);
            assert_eq!(ledger.serialize(), bytes);
        }
    }

    #[test]
    fn sync_recomputes_offsets() {
        let mut ledger = AsnLedger::new(11, 16, 3);
        ledger.sync_from_beacon([5, 0, 0, 0, 0]);
        assert_eq!(ledger.asn().as_u64(), 5);
        assert_eq!(ledger.slot_offset(), 5);
        assert_eq!(ledger.data_hop_offset(), 5);
        assert_eq!(ledger.beacon_hop_offset(), 2);

        ledger.sync_from_beacon([0x10, 0x27, 0x01, 0, 0]);
        let asn = 0x1_2710u64;
        assert_eq!(ledger.slot_offset(), (asn % 11) as u16);
        assert_eq!(ledger.data_hop_offset(), (asn % 16) as u8);
        assert_eq!(ledger.beacon_hop_offset(), (asn % 3) as u8);
    }

    #[test]
    fn advance_keeps_offsets_in_step() {
        let mut ledger = AsnLedger::new(7, 16, 3);
        for _ in 0..1000 {
            ledger.advance();
            let asn = ledger.asn().as_u64();
            assert_eq!(ledger.slot_offset() as u64, asn % 7);
            assert_eq!(ledger.data_hop_offset() as u64, asn % 16);
            assert_eq!(ledger.beacon_hop_offset() as u64, asn % 3);
        }
    }

    #[test]
    fn difference() {
        let a = Asn::from_u64(0x01_0002_0003);
        assert_eq!(a.difference(&a), Some(0));
        assert_eq!(Asn::from_u64(0x0000_0010).difference(&Asn::from_u64(0x0000_0004)), Some(12));
        assert_eq!(
            Asn::from_u64(0x0001_0002).difference(&Asn::from_u64(0x0000_fff0)),
            Some(0x12)
        );
        assert_eq!(Asn::from_u64(0x01_0000_0000).difference(&Asn::from_u64(0x00_0000_0000)), None);
        assert_eq!(Asn::from_u64(0x02_0000_0005).difference(&Asn::from_u64(0x01_0000_0005)), None);
        assert_eq!(Asn::from_u64(0x0002_0000).difference(&Asn::from_u64(0x0000_0000)), None);
        assert_eq!(Asn::from_u64(0x00_0000_0005).difference(&Asn::from_u64(0x00_ffff_0003)), None);
        assert_eq!(
            Asn::from_u64(0x0001_fff0).difference(&Asn::from_u64(0x0000_0010)),
            Some(0x1_ffe0)
        );
        assert_eq!(Asn::from_u64(0x0000_0004).difference(&Asn::from_u64(0x0000_0010)), None);
    }
}
