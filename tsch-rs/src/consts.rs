//! Slot timing and protocol constants.
//!
//! All timings are in ticks of the 32768 Hz slot timer and describe a 15 ms slot.

use crate::time::Duration;

/// Length of a single timeslot
#[doc(alias = "TsSlotDuration")]
pub const SLOT_DURATION: Duration = Duration::from_ticks(491);

/// Offset from the slot boundary at which the first byte of a frame is on the air
#[doc(alias = "TsTxOffset")]
pub const TX_OFFSET: Duration = Duration::from_ticks(131);

/// Margin a receiver listens before and after the expected frame start
#[doc(alias = "TsLongGT")]
pub const LONG_GUARD_TIME: Duration = Duration::from_ticks(43);

/// Worst case time needed to get a frame into the radio
pub const MAX_TX_DATA_PREPARE: Duration = Duration::from_ticks(66);

/// Worst case time needed to get the radio ready for reception
pub const MAX_RX_DATA_PREPARE: Duration = Duration::from_ticks(33);

/// Time between the transmit command and the start of frame on the air
pub const DELAY_TX: Duration = Duration::from_ticks(18);

/// Time between the listen command and the radio actually listening
pub const DELAY_RX: Duration = Duration::from_ticks(0);

/// How long the radio may take to start sending after the transmit command
pub const WD_RADIO_TX: Duration = Duration::from_ticks(33);

/// Airtime of the longest frame, plus margin
pub const WD_DATA_DURATION: Duration = Duration::from_ticks(164);

/// A beacon captured closer than this to the end of the slot does not mark a usable boundary
#[doc(alias = "RESYNCHRONIZATIONGUARD")]
pub const RESYNCHRONIZATION_GUARD: Duration = Duration::from_ticks(5);

/// Time corrections beyond this are suspicious and get logged
#[doc(alias = "LIMITLARGETIMECORRECTION")]
pub const LIMIT_LARGE_TIME_CORRECTION: Duration = Duration::from_ticks(5);

/// Slots without a synchronizing frame before the node gives up on the network (35 s)
#[doc(alias = "DESYNCTIMEOUT")]
pub const DESYNC_TIMEOUT: u16 = 2333;

/// Number of slots in the repeating schedule
pub const SLOTFRAME_LENGTH: u16 = 101;

/// Channel an unsynchronized node starts scanning on
pub const SYNCHRONIZING_CHANNEL: u8 = 20;

/// Number of slots a scanning node stays on one beacon channel
#[doc(alias = "EB_SLOWHOPPING_PERIOD")]
pub const EB_SLOW_HOPPING_PERIOD: u16 = 100;

/// The full hopping sequence used by data cells, as offsets from channel 11
pub const DATA_HOPPING_SEQUENCE: [u8; 16] = [5, 6, 12, 7, 15, 4, 14, 11, 8, 0, 1, 2, 13, 3, 9, 10];

/// The short hopping sequence used by beacon cells, as offsets from channel 11
pub const BEACON_HOPPING_SEQUENCE: [u8; 3] = [4, 9, 14];

/// On average one out of this many shared cells is used for origination
#[doc(alias = "AVERAGEDEGREE")]
pub const AVERAGE_DEGREE: u16 = 4;

/// Transmissions a frame gets before it is reported as failed
pub const DEFAULT_TX_RETRIES: u8 = 3;

/// Radio on-time accounting is halved once the total window exceeds this
pub const DUTY_CYCLE_WINDOW_LIMIT: u32 = u32::MAX >> 1;

/// The maximum PSDU size (in octets) the PHY shall be able to receive.
#[doc(alias = "aMaxPHYPacketSize")]
pub const MAX_PHY_PACKET_SIZE: usize = 127;

/// Length of the frame check sequence the radio appends
pub const LENGTH_CRC: usize = 2;

/// Frames shorter than this cannot even hold a check sequence
pub const MIN_FRAME_LENGTH: usize = LENGTH_CRC;

/// Capacity of the queue of frames waiting for a transmit cell
pub const TX_QUEUE_SIZE: usize = 8;

/// Capacity of the queue of notifications waiting for the upper layer
pub const NOTIFICATION_QUEUE_SIZE: usize = 4;
