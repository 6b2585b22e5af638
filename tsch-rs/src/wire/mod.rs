//! The frames exchanged by the MAC.
//!
//! Every frame starts with a 16-bit type discriminator followed by the short address of
//! the sender. All words are little endian.

use byte::{check_len, BytesExt, TryRead, TryWrite, LE};

pub mod beacon;

pub use beacon::Beacon;

/// A 16-bit short address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ShortAddress(pub u16);

impl ShortAddress {
    /// Not a valid sender, used by nodes that have no address yet
    pub const BROADCAST: Self = Self(0xffff);
}

impl TryRead<'_> for ShortAddress {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        Ok((Self(bytes.read_with(offset, LE)?), *offset))
    }
}

impl TryWrite for ShortAddress {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write_with(offset, self.0, LE)?;
        Ok(*offset)
    }
}

/// The type discriminator in the first two bytes of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u16)]
pub enum FrameType {
    Beacon = 0xEB0B,
    Data = 0xDA7A,
}

impl FrameType {
    /// Look at the discriminator without parsing the rest of the frame
    pub fn peek(bytes: &[u8]) -> Option<Self> {
        bytes.read_with::<u16>(&mut 0, LE).ok().and_then(Self::from_u16)
    }

    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0xEB0B => Some(Self::Beacon),
            0xDA7A => Some(Self::Data),
            _ => None,
        }
    }
}

impl TryRead<'_> for FrameType {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        let value: u16 = bytes.read_with(offset, LE)?;
        let frame_type = Self::from_u16(value).ok_or(byte::Error::BadInput {
            err: "unknown frame type",
        })?;
        Ok((frame_type, *offset))
    }
}

impl TryWrite for FrameType {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write_with(offset, self as u16, LE)?;
        Ok(*offset)
    }
}

/// A frame carrying upper layer payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct DataFrame<'p> {
    pub source: ShortAddress,
    pub payload: &'p [u8],
}

impl DataFrame<'_> {
    pub const HEADER_LENGTH: usize = 4;
}

impl<'p> TryRead<'p> for DataFrame<'p> {
    fn try_read(bytes: &'p [u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        check_len(bytes, Self::HEADER_LENGTH)?;
        match bytes.read(offset)? {
            FrameType::Data => {}
            FrameType::Beacon => {
                return Err(byte::Error::BadInput {
                    err: "not a data frame",
                })
            }
        }
        let source = bytes.read(offset)?;
        let payload = &bytes[*offset..];
        *offset += payload.len();
        Ok((Self { source, payload }, *offset))
    }
}

impl TryWrite for DataFrame<'_> {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        check_len(bytes, Self::HEADER_LENGTH + self.payload.len())?;
        bytes.write(offset, FrameType::Data)?;
        bytes.write(offset, self.source)?;
        bytes[*offset..*offset + self.payload.len()].copy_from_slice(self.payload);
        *offset += self.payload.len();
        Ok(*offset)
    }
}

/// Any frame the MAC understands, told apart by its discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Frame<'p> {
    Beacon(Beacon),
    Data(DataFrame<'p>),
}

impl Frame<'_> {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Beacon(_) => FrameType::Beacon,
            Frame::Data(_) => FrameType::Data,
        }
    }

    /// The claimed sender of the frame
    pub fn source(&self) -> ShortAddress {
        match self {
            Frame::Beacon(beacon) => beacon.source,
            Frame::Data(data) => data.source,
        }
    }
}

impl<'p> TryRead<'p> for Frame<'p> {
    /// Parses a complete frame without its check sequence
    fn try_read(bytes: &'p [u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        match FrameType::try_read(bytes, ())?.0 {
            FrameType::Beacon => {
                let (beacon, len) = Beacon::try_read(bytes, ())?;
                if len != bytes.len() {
                    return Err(byte::Error::BadInput {
                        err: "beacon length mismatch",
                    });
                }
                Ok((Frame::Beacon(beacon), len))
            }
            FrameType::Data => {
                let (data, len) = DataFrame::try_read(bytes, ())?;
                Ok((Frame::Data(data), len))
            }
        }
    }
}

impl TryWrite for Frame<'_> {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        match self {
            Frame::Beacon(beacon) => beacon.try_write(bytes, ()),
            Frame::Data(data) => data.try_write(bytes, ()),
        }
    }
}
