use byte::TryWrite;
use heapless::Vec;

use crate::{
    asn::Asn,
    consts::{DEFAULT_TX_RETRIES, LENGTH_CRC, MAX_PHY_PACKET_SIZE},
    wire::{Frame, FrameType},
};

/// Who currently holds a packet.
///
/// Nothing enforces this: it documents the hand-offs between the MAC and the upper layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Component {
    #[default]
    Pool,
    /// The slot state machine
    Mac,
    /// Handed over to the upper layer
    Upper,
    /// Queued by the upper layer, waiting for a transmit cell
    UpperToMac,
    /// Waiting in the notification queue
    MacToUpper,
}

/// A frame buffer with its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub creator: Component,
    pub owner: Component,
    /// The frame, without check sequence
    pub data: Vec<u8, MAX_PHY_PACKET_SIZE>,
    pub rssi: i8,
    pub lqi: u8,
    pub crc_valid: bool,
    /// The slot the packet was sent or received in
    pub asn: Asn,
    pub tx_attempts: u8,
    pub retries_left: u8,
}

impl Packet {
    /// An empty packet, as handed out by a pool
    pub fn new(owner: Component) -> Self {
        Self {
            creator: owner,
            owner,
            data: Vec::new(),
            rssi: 0,
            lqi: 0,
            crc_valid: false,
            asn: Asn::ZERO,
            tx_attempts: 0,
            retries_left: DEFAULT_TX_RETRIES,
        }
    }

    /// What kind of frame the packet holds, if it holds a valid one
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::peek(&self.data)
    }

    pub fn is_beacon(&self) -> bool {
        self.frame_type() == Some(FrameType::Beacon)
    }

    pub fn is_data(&self) -> bool {
        self.frame_type() == Some(FrameType::Data)
    }

    /// Serialize a frame into the packet, replacing what was there.
    ///
    /// Room is left for the check sequence the radio appends.
    pub fn write_frame(&mut self, frame: Frame<'_>) -> byte::Result<usize> {
        self.data.clear();
        // The capacity is MAX_PHY_PACKET_SIZE, so this can't fail
        let _ = self.data.resize_default(MAX_PHY_PACKET_SIZE);

        match frame.try_write(&mut self.data[..MAX_PHY_PACKET_SIZE - LENGTH_CRC], ()) {
            Ok(len) => {
                self.data.truncate(len);
                Ok(len)
            }
            Err(e) => {
                self.data.clear();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::wire::{DataFrame, ShortAddress};

    #[test]
    fn write_frame_leaves_room_for_crc() {
        let mut packet = Packet::new(Component::Upper);

        let payload = [0xab; MAX_PHY_PACKET_SIZE - LENGTH_CRC - DataFrame::HEADER_LENGTH];
        let frame = Frame::Data(DataFrame {
            source: ShortAddress(9),
            payload: &payload,
        });
        assert_eq!(packet.write_frame(frame), Ok(MAX_PHY_PACKET_SIZE - LENGTH_CRC));
        assert!(packet.is_data());

        let too_long = [0xab; MAX_PHY_PACKET_SIZE - LENGTH_CRC - DataFrame::HEADER_LENGTH + 1];
        let frame = Frame::Data(DataFrame {
            source: ShortAddress(9),
            payload: &too_long,
        });
        assert!(packet.write_frame(frame).is_err());
        assert!(packet.data.is_empty());
        assert_eq!(packet.frame_type(), None);
    }
}
