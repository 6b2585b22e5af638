use heapless::Vec;

use crate::{
    consts::MAX_PHY_PACKET_SIZE,
    hopping::Channel,
    time::{Duration, Instant},
};

/// The radio transceiver together with the slot timer that drives the MAC.
///
/// All calls are made from interrupt context and must return quickly: arming the
/// radio is fire-and-forget, completion is reported later through a [RadioEvent].
///
/// The driver is expected to call [crate::mac::MacEngine::handle_event] for:
/// - every overflow of the slot timer ([RadioEvent::NewSlot]),
/// - the compare register matching ([RadioEvent::Compare]),
/// - the start and end of every frame on the air, for transmission and reception alike.
pub trait Radio {
    #[cfg(not(feature = "defmt-03"))]
    type Error: core::error::Error;
    #[cfg(feature = "defmt-03")]
    type Error: core::error::Error + defmt::Format;

    /// Tune to the channel. Only called while the radio is off.
    fn set_frequency(&mut self, channel: Channel) -> Result<(), Self::Error>;

    /// Power up the receiver without listening yet
    fn rx_enable(&mut self) -> Result<(), Self::Error>;

    /// Start listening
    fn rx_now(&mut self) -> Result<(), Self::Error>;

    /// Copy a frame into the transmit buffer.
    ///
    /// The last two bytes are room for the check sequence, which the radio fills in.
    fn load_packet(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Power up the transmitter without sending yet
    fn tx_enable(&mut self) -> Result<(), Self::Error>;

    /// Send the loaded frame
    fn tx_now(&mut self) -> Result<(), Self::Error>;

    /// Power down, aborting anything in progress
    fn rf_off(&mut self) -> Result<(), Self::Error>;

    /// Copy the last received frame, including its check sequence, into the buffer
    fn get_received_frame(
        &mut self,
        buffer: &mut Vec<u8, MAX_PHY_PACKET_SIZE>,
    ) -> Result<ReceivedFrameInfo, Self::Error>;

    /// The current value of the slot timer
    fn timer_value(&self) -> Instant;

    /// The period of the slot timer: the length of the current slot
    fn timer_period(&self) -> Duration;

    /// Change the period of the slot timer. This takes effect for the running slot.
    fn set_timer_period(&mut self, period: Duration);

    /// Fire [RadioEvent::Compare] once when the slot timer reaches the given value.
    /// This replaces any compare that was still pending.
    fn schedule_compare(&mut self, at: Instant);

    fn cancel_compare(&mut self);
}

/// Metadata the radio captured with a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ReceivedFrameInfo {
    pub rssi: i8,
    pub lqi: u8,
    pub crc_valid: bool,
}

/// The interrupts that drive the MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RadioEvent {
    /// The slot timer overflowed: a new slot begins
    NewSlot,
    /// The compare register of the slot timer matched
    Compare,
    /// The first byte after the preamble went over the air, captured at the given time
    StartOfFrame(Instant),
    /// The last byte went over the air, captured at the given time
    EndOfFrame(Instant),
}
