use core::fmt::Display;

use crate::{asn::AsnLedger, schedule::CellType, ConfigError};

/// An IEEE 802.15.4 channel in the 2.4 GHz band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Channel(u8);

impl Channel {
    pub const FIRST: u8 = 11;
    pub const LAST: u8 = 26;
    /// Number of channels in the band
    pub const COUNT: u8 = Self::LAST - Self::FIRST + 1;

    pub const fn new(number: u8) -> Option<Self> {
        if number >= Self::FIRST && number <= Self::LAST {
            Some(Self(number))
        } else {
            None
        }
    }

    /// The channel at `offset` from the first channel of the band
    pub const fn from_offset(offset: u8) -> Option<Self> {
        match Self::FIRST.checked_add(offset) {
            Some(number) => Self::new(number),
            None => None,
        }
    }

    pub const fn number(&self) -> u8 {
        self.0
    }

    pub const fn offset(&self) -> u8 {
        self.0 - Self::FIRST
    }

    /// Parse the single channel setting: `0` means channel hopping
    pub fn single_channel_setting(number: u8) -> Result<Option<Self>, ConfigError> {
        match number {
            0 => Ok(None),
            n => Self::new(n).map(Some).ok_or(ConfigError::InvalidChannel(n)),
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// A hopping sequence: offsets from the first channel, each below 16
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoppingSequence(heapless::Vec<u8, { Channel::COUNT as usize }>);

impl HoppingSequence {
    pub fn new(offsets: &[u8]) -> Result<Self, ConfigError> {
        if offsets.is_empty() {
            return Err(ConfigError::EmptyHoppingSequence);
        }

        if let Some(&bad) = offsets.iter().find(|&&o| o >= Channel::COUNT) {
            return Err(ConfigError::InvalidHoppingOffset(bad));
        }

        heapless::Vec::from_slice(offsets)
            .map(Self)
            .map_err(|_| ConfigError::HoppingSequenceTooLong(offsets.len()))
    }

    pub fn len(&self) -> u8 {
        self.0.len() as u8
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The channel at an arbitrary (wrapping) position in the sequence
    pub fn channel_at(&self, position: u16) -> Channel {
        let offset = self.0[position as usize % self.0.len()];
        Channel(Channel::FIRST + offset)
    }

    /// The position of a channel in the sequence, if it is used at all
    pub fn position_of(&self, channel: Channel) -> Option<u8> {
        self.0
            .iter()
            .position(|&o| o == channel.offset())
            .map(|p| p as u8)
    }
}

/// Maps a cell to the radio channel it uses in the current slot
#[derive(Debug, Clone)]
pub struct FrequencyHopper {
    data: HoppingSequence,
    beacon: HoppingSequence,
    single_channel: Option<Channel>,
}

impl FrequencyHopper {
    pub fn new(
        data: HoppingSequence,
        beacon: HoppingSequence,
        single_channel: Option<Channel>,
    ) -> Self {
        Self {
            data,
            beacon,
            single_channel,
        }
    }

    pub fn data_sequence(&self) -> &HoppingSequence {
        &self.data
    }

    pub fn beacon_sequence(&self) -> &HoppingSequence {
        &self.beacon
    }

    pub fn single_channel(&self) -> Option<Channel> {
        self.single_channel
    }

    pub fn set_single_channel(&mut self, single_channel: Option<Channel>) {
        self.single_channel = single_channel;
    }

    /// The channel to use for a cell in the slot the ledger is at.
    ///
    /// The single channel override never applies to beacon cells, so scanning
    /// nodes can still find the network.
    pub fn compute_channel(
        &self,
        ledger: &AsnLedger,
        cell_type: CellType,
        channel_offset: u8,
    ) -> Channel {
        match (cell_type, self.single_channel) {
            (CellType::Beacon, _) => self
                .beacon
                .channel_at(ledger.beacon_hop_offset() as u16 + channel_offset as u16),
            (_, Some(channel)) => channel,
            (_, None) => self
                .data
                .channel_at(ledger.data_hop_offset() as u16 + channel_offset as u16),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::consts::{BEACON_HOPPING_SEQUENCE, DATA_HOPPING_SEQUENCE};

    const CELL_TYPES: [CellType; 5] = [
        CellType::Idle,
        CellType::Tx,
        CellType::Rx,
        CellType::TxRx,
        CellType::Beacon,
    ];

    fn hopper(single_channel: Option<Channel>) -> FrequencyHopper {
        FrequencyHopper::new(
            HoppingSequence::new(&DATA_HOPPING_SEQUENCE).unwrap(),
            HoppingSequence::new(&BEACON_HOPPING_SEQUENCE).unwrap(),
            single_channel,
        )
    }

    #[test]
    fn always_in_band() {
        let hopper = hopper(None);
        let mut ledger = AsnLedger::new(101, 16, 3);

        for _ in 0..48 {
            for cell_type in CELL_TYPES {
                for channel_offset in 0..=u8::MAX {
                    let channel = hopper.compute_channel(&ledger, cell_type, channel_offset);
                    assert!((11..=26).contains(&channel.number()));
                }
            }
            ledger.advance();
        }
    }

    #[test]
    fn single_channel_override() {
        let fixed = Channel::new(17).unwrap();
        let hopper = hopper(Some(fixed));
        let mut ledger = AsnLedger::new(101, 16, 3);

        for _ in 0..16 {
            for cell_type in CELL_TYPES.into_iter().filter(|c| *c != CellType::Beacon) {
                for channel_offset in 0..16 {
                    assert_eq!(hopper.compute_channel(&ledger, cell_type, channel_offset), fixed);
                }
            }

            let beacon = hopper.compute_channel(&ledger, CellType::Beacon, 0);
            assert!(BEACON_HOPPING_SEQUENCE.contains(&beacon.offset()));
            ledger.advance();
        }
    }

    #[test]
    fn follows_sequences() {
        let hopper = hopper(None);
        let mut ledger = AsnLedger::new(101, 16, 3);
        ledger.sync_from_beacon([7, 0, 0, 0, 0]);

        assert_eq!(
            hopper.compute_channel(&ledger, CellType::TxRx, 2).number(),
            11 + DATA_HOPPING_SEQUENCE[9]
        );
        assert_eq!(
            hopper.compute_channel(&ledger, CellType::Beacon, 0).number(),
            11 + BEACON_HOPPING_SEQUENCE[1]
        );
    }

    #[test]
    fn settings_are_validated() {
        assert_eq!(Channel::single_channel_setting(0), Ok(None));
        assert_eq!(Channel::single_channel_setting(26), Ok(Channel::new(26).map(Some).unwrap()));
        assert_eq!(Channel::single_channel_setting(10), Err(ConfigError::InvalidChannel(10)));
        assert_eq!(Channel::single_channel_setting(27), Err(ConfigError::InvalidChannel(27)));

        assert_eq!(HoppingSequence::new(&[]), Err(ConfigError::EmptyHoppingSequence));
        assert_eq!(HoppingSequence::new(&[3, 16]), Err(ConfigError::InvalidHoppingOffset(16)));
        assert_eq!(
            HoppingSequence::new(&[0; 17]),
            Err(ConfigError::HoppingSequenceTooLong(17))
        );
    }
}
