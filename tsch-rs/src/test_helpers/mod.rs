//! Stand-ins for the hardware, to drive the MAC engine by hand in tests

use core::fmt::Display;

use rand_core::RngCore;

use crate::{
    consts::{MAX_PHY_PACKET_SIZE, SLOT_DURATION},
    hopping::Channel,
    radio::{Radio, ReceivedFrameInfo},
    time::{Duration, Instant},
};

/// A call made on a [MockRadio]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    SetFrequency(Channel),
    RxEnable,
    RxNow,
    LoadPacket(Vec<u8>),
    TxEnable,
    TxNow,
    RfOff,
    GetReceivedFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockRadioError;

impl Display for MockRadioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "mock radio failure")
    }
}

impl core::error::Error for MockRadioError {}

/// A radio that records what the MAC asks of it.
///
/// The timer doesn't run by itself: tests set [MockRadio::now] and inject the
/// events the hardware would raise.
#[derive(Debug)]
pub struct MockRadio {
    pub calls: Vec<RadioCall>,
    pub now: Instant,
    pub period: Duration,
    pub compare: Option<Instant>,
    /// Returned by the next [Radio::get_received_frame], check sequence included
    pub rx_frame: Vec<u8>,
    pub rx_info: ReceivedFrameInfo,
    /// Make every call fail
    pub broken: bool,
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            now: Instant::SLOT_START,
            period: SLOT_DURATION,
            compare: None,
            rx_frame: Vec::new(),
            rx_info: ReceivedFrameInfo::default(),
            broken: false,
        }
    }

    /// Put a frame in the receive buffer. Two check sequence bytes are added to it.
    pub fn receive(&mut self, frame: &[u8], crc_valid: bool) {
        self.rx_frame.clear();
        self.rx_frame.extend_from_slice(frame);
        self.rx_frame.extend_from_slice(&[0xc0, 0xc1]);
        self.rx_info = ReceivedFrameInfo {
            rssi: -60,
            lqi: 200,
            crc_valid,
        };
    }

    pub fn take_calls(&mut self) -> Vec<RadioCall> {
        core::mem::take(&mut self.calls)
    }

    /// The channel the radio was last tuned to
    pub fn frequency(&self) -> Option<Channel> {
        self.calls.iter().rev().find_map(|call| match call {
            RadioCall::SetFrequency(channel) => Some(*channel),
            _ => None,
        })
    }

    /// The last frame that was loaded for transmission
    pub fn loaded(&self) -> Option<&[u8]> {
        self.calls.iter().rev().find_map(|call| match call {
            RadioCall::LoadPacket(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    fn record(&mut self, call: RadioCall) -> Result<(), MockRadioError> {
        self.calls.push(call);
        if self.broken {
            Err(MockRadioError)
        } else {
            Ok(())
        }
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Radio for MockRadio {
    type Error = MockRadioError;

    fn set_frequency(&mut self, channel: Channel) -> Result<(), Self::Error> {
        self.record(RadioCall::SetFrequency(channel))
    }

    fn rx_enable(&mut self) -> Result<(), Self::Error> {
        self.record(RadioCall::RxEnable)
    }

    fn rx_now(&mut self) -> Result<(), Self::Error> {
        self.record(RadioCall::RxNow)
    }

    fn load_packet(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.record(RadioCall::LoadPacket(data.to_vec()))
    }

    fn tx_enable(&mut self) -> Result<(), Self::Error> {
        self.record(RadioCall::TxEnable)
    }

    fn tx_now(&mut self) -> Result<(), Self::Error> {
        self.record(RadioCall::TxNow)
    }

    fn rf_off(&mut self) -> Result<(), Self::Error> {
        self.record(RadioCall::RfOff)
    }

    fn get_received_frame(
        &mut self,
        buffer: &mut heapless::Vec<u8, MAX_PHY_PACKET_SIZE>,
    ) -> Result<ReceivedFrameInfo, Self::Error> {
        self.record(RadioCall::GetReceivedFrame)?;
        *buffer = heapless::Vec::from_slice(&self.rx_frame).map_err(|_| MockRadioError)?;
        Ok(self.rx_info)
    }

    fn timer_value(&self) -> Instant {
        self.now
    }

    fn timer_period(&self) -> Duration {
        self.period
    }

    fn set_timer_period(&mut self, period: Duration) {
        self.period = period;
    }

    fn schedule_compare(&mut self, at: Instant) {
        self.compare = Some(at);
    }

    fn cancel_compare(&mut self) {
        self.compare = None;
    }
}

/// Always yields the same number, so shared cells are either always or never used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstRng(pub u32);

impl RngCore for ConstRng {
    fn next_u32(&mut self) -> u32 {
        self.0
    }

    fn next_u64(&mut self) -> u64 {
        self.0 as u64
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for (byte, value) in dst.iter_mut().zip(self.0.to_le_bytes().into_iter().cycle()) {
            *byte = value;
        }
    }
}
