use heapless::Vec;

use crate::{
    asn::SlotOffset,
    consts::{MAX_PHY_PACKET_SIZE, SLOT_DURATION},
    hopping::Channel,
    packet::Packet,
    schedule::CellType,
    time::{Duration, Instant},
};

/// Where the slot state machine is within the current slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SlotState {
    /// Nothing to do until the next slot boundary
    #[default]
    Sleeping,

    // Not synchronized: hunting for a beacon
    SyncListening,
    SyncReceiving,
    SyncProcessing,

    // Transmit cell
    TxOffset,
    TxPrepare,
    TxReady,
    TxDelay,
    Transmitting,
    /// Done transmitting. Acknowledgements are not used, so the slot ends right away.
    RxAckOffset,

    // Receive cell
    RxOffset,
    RxPrepare,
    RxReady,
    RxListening,
    Receiving,
    /// Done receiving. Acknowledgements are not used, so the slot ends right away.
    TxAckOffset,
}

/// Everything the engine remembers between interrupts
#[derive(Debug)]
pub(crate) struct MacState {
    pub slot_state: SlotState,
    pub is_sync: bool,
    /// Slots left until synchronization is declared lost
    pub desync_timeout: u16,
    pub next_active_slot_offset: Option<SlotOffset>,

    /// The cell being served
    pub cell_type: CellType,
    pub channel_offset: u8,
    /// The channel the radio is tuned to
    pub channel: Channel,

    /// Taken from the transmit queue for this slot
    pub data_to_send: Option<Packet>,
    /// Received and accepted, not yet handed to the upper layer
    pub data_received: Option<Packet>,
    /// The frame as handed to the radio, with room for the check sequence
    pub local_copy: Vec<u8, MAX_PHY_PACKET_SIZE>,

    pub last_captured_time: Instant,
    /// Start of the last received frame, used to resynchronize on it
    pub sync_captured_time: Instant,
    /// Length of the next slot while scanning
    pub sync_slot_length: Duration,
    pub time_correction: Duration,

    pub radio_on_since: Option<Instant>,
    /// Radio on time in the running slot
    pub radio_on_ticks: Duration,
    /// Whether the running slot went into the duty cycle already
    pub slot_accounted: bool,

    /// Counts slots while scanning, the scan channel changes when it wraps
    pub join_channel_changing_counter: u16,
    pub single_channel_changed: bool,
}

impl MacState {
    pub fn new(scan_channel: Channel) -> Self {
        Self {
            slot_state: SlotState::Sleeping,
            is_sync: false,
            desync_timeout: 0,
            next_active_slot_offset: None,
            cell_type: CellType::Idle,
            channel_offset: 0,
            channel: scan_channel,
            data_to_send: None,
            data_received: None,
            local_copy: Vec::new(),
            last_captured_time: Instant::SLOT_START,
            sync_captured_time: Instant::SLOT_START,
            sync_slot_length: SLOT_DURATION,
            time_correction: Duration::ZERO,
            radio_on_since: None,
            radio_on_ticks: Duration::ZERO,
            slot_accounted: false,
            join_channel_changing_counter: 0,
            single_channel_changed: false,
        }
    }
}
