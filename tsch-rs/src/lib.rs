#![cfg_attr(not(any(test, feature = "std")), no_std)]

use core::fmt::Display;

// This must go FIRST so that all the other modules see its macros.
mod fmt;

pub mod asn;
pub mod consts;
pub mod hopping;
pub mod mac;
pub mod neighborhood;
pub mod packet;
pub mod pool;
pub mod radio;
pub mod schedule;
pub mod stats;
#[cfg(feature = "test_helpers")]
pub mod test_helpers;
pub mod time;
pub mod wire;

/// A configuration value was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ConfigError {
    /// Channels are 11 to 26, or 0 to disable the single channel mode
    InvalidChannel(u8),
    EmptyHoppingSequence,
    /// Hopping sequence entries are offsets from channel 11 and must be below 16
    InvalidHoppingOffset(u8),
    HoppingSequenceTooLong(usize),
    ZeroSlotframeLength,
    ZeroAverageDegree,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl core::error::Error for ConfigError {}
