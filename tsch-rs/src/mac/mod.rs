//! The slot state machine.
//!
//! The engine is driven entirely by [RadioEvent]s: every slot starts with a timer overflow,
//! after which compare interrupts and frame capture interrupts walk it through a transmit or
//! a receive activity. A node that is not synchronized instead listens for a beacon to
//! learn the network's ASN from.

use core::fmt::{Debug, Display};

use rand_core::RngCore;

use crate::{
    asn::{Asn, AsnLedger, SlotOffset},
    consts::{
        AVERAGE_DEGREE, BEACON_HOPPING_SEQUENCE, DATA_HOPPING_SEQUENCE, DESYNC_TIMEOUT,
        DUTY_CYCLE_WINDOW_LIMIT, EB_SLOW_HOPPING_PERIOD, LIMIT_LARGE_TIME_CORRECTION,
        SLOTFRAME_LENGTH, SLOT_DURATION, SYNCHRONIZING_CHANNEL,
    },
    hopping::{Channel, FrequencyHopper, HoppingSequence},
    neighborhood::Neighborhood,
    packet::Component,
    pool::BufferPool,
    radio::{Radio, RadioEvent},
    schedule::{CellType, Schedule},
    stats::{DebugCounters, MacStats},
    time::{Duration, Instant},
    wire::{Beacon, Frame, ShortAddress},
    ConfigError,
};

pub mod commander;
mod end_slot;
mod rx;
mod state;
mod synchronize;
mod tx;

use commander::{MacCommander, MacHandler, MacStatus};
use state::MacState;
pub use state::SlotState;

/// Configuration of the MAC engine
#[derive(Debug, Clone)]
pub struct MacConfig<Rng: RngCore> {
    /// Decides which shared cells are used for origination
    pub rng: Rng,
    /// The root keeps the clock of the network and never loses synchronization
    pub is_dag_root: bool,
    pub slotframe_length: u16,
    /// On average one out of this many beacon and shared cells is used to send
    pub average_degree: u16,
    /// Channel used for all non-beacon cells, `0` to hop
    pub single_channel: u8,
    /// Offsets from channel 11
    pub data_hopping_sequence: &'static [u8],
    /// Offsets from channel 11
    pub beacon_hopping_sequence: &'static [u8],
    /// Where scanning starts
    pub scan_channel: u8,
    /// Slots spent on each beacon channel while scanning
    pub eb_slow_hopping_period: u16,
    /// Slots without resynchronization before the network is considered lost
    pub desync_timeout: u16,
    pub large_time_correction: Duration,
    pub duty_cycle_window_limit: u32,
    /// Log the captured times of every frame
    pub trace_slot_timing: bool,
}

impl<Rng: RngCore> MacConfig<Rng> {
    pub fn new(rng: Rng) -> Self {
        Self {
            rng,
            is_dag_root: false,
            slotframe_length: SLOTFRAME_LENGTH,
            average_degree: AVERAGE_DEGREE,
            single_channel: 0,
            data_hopping_sequence: &DATA_HOPPING_SEQUENCE,
            beacon_hopping_sequence: &BEACON_HOPPING_SEQUENCE,
            scan_channel: SYNCHRONIZING_CHANNEL,
            eb_slow_hopping_period: EB_SLOW_HOPPING_PERIOD,
            desync_timeout: DESYNC_TIMEOUT,
            large_time_correction: LIMIT_LARGE_TIME_CORRECTION,
            duty_cycle_window_limit: DUTY_CYCLE_WINDOW_LIMIT,
            trace_slot_timing: false,
        }
    }
}

/// A timer the engine arms to either start the next step of an activity or to
/// catch a step that never completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Watchdog {
    TxDataPrepare,
    RadioTx,
    TxDataDuration,
    RxDataPrepare,
    RxDataDuration,
}

/// Why a slot was aborted. The engine always recovers by ending the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SlotFault<RE> {
    RadioError(RE),
    /// The event can't happen in this state
    WrongState {
        event: RadioEvent,
        state: SlotState,
        slot_offset: SlotOffset,
    },
    WatchdogExpired {
        watchdog: Watchdog,
        slot_offset: SlotOffset,
    },
    NoFreeBuffer,
    /// The schedule called a cell active but has no use for it
    WrongCellType {
        cell_type: CellType,
        slot_offset: SlotOffset,
    },
    /// The frame leaves no room for the check sequence
    FrameTooLong(usize),
    /// No frame from the time source for too long
    Desynchronized { slot_offset: SlotOffset },
}

impl<RE: Debug> Display for SlotFault<RE> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<RE: Debug> core::error::Error for SlotFault<RE> {}

impl<RE> From<RE> for SlotFault<RE> {
    fn from(value: RE) -> Self {
        Self::RadioError(value)
    }
}

/// Why a received frame was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RejectReason {
    Length(usize),
    Crc,
    FrameType,
    Malformed,
    /// The sender is not a neighbor we talk to
    Topology(ShortAddress),
    /// Too close to the end of the slot to resynchronize on
    TooLate,
}

/// The TSCH MAC engine.
///
/// Call [MacEngine::handle_event] from the radio and slot timer interrupts.
/// The upper layer talks to the engine through the [MacCommander] it was created with.
pub struct MacEngine<'a, R, S, N, P, Rng>
where
    R: Radio,
    S: Schedule,
    N: Neighborhood,
    P: BufferPool,
    Rng: RngCore,
{
    radio: R,
    schedule: S,
    neighborhood: N,
    pool: &'a P,
    handler: MacHandler<'a>,
    config: MacConfig<Rng>,
    hopper: FrequencyHopper,
    scan_channel: Channel,
    ledger: AsnLedger,
    state: MacState,
    stats: MacStats,
    debug: DebugCounters,
}

impl<'a, R, S, N, P, Rng> MacEngine<'a, R, S, N, P, Rng>
where
    R: Radio,
    S: Schedule,
    N: Neighborhood,
    P: BufferPool,
    Rng: RngCore,
{
    pub fn new(
        mut radio: R,
        schedule: S,
        neighborhood: N,
        pool: &'a P,
        commander: &'a MacCommander,
        config: MacConfig<Rng>,
    ) -> Result<Self, ConfigError> {
        if config.slotframe_length == 0 {
            return Err(ConfigError::ZeroSlotframeLength);
        }
        if config.average_degree == 0 {
            return Err(ConfigError::ZeroAverageDegree);
        }
        let data = HoppingSequence::new(config.data_hopping_sequence)?;
        let beacon = HoppingSequence::new(config.beacon_hopping_sequence)?;
        let single_channel = Channel::single_channel_setting(config.single_channel)?;
        let scan_channel =
            Channel::new(config.scan_channel).ok_or(ConfigError::InvalidChannel(config.scan_channel))?;

        let ledger = AsnLedger::new(config.slotframe_length, data.len(), beacon.len());
        radio.set_timer_period(SLOT_DURATION);

        let mut engine = Self {
            radio,
            schedule,
            neighborhood,
            pool,
            handler: commander.get_handler(),
            config,
            hopper: FrequencyHopper::new(data, beacon, single_channel),
            scan_channel,
            ledger,
            state: MacState::new(scan_channel),
            stats: MacStats::new(),
            debug: DebugCounters::default(),
        };

        if engine.config.is_dag_root {
            engine.change_is_sync(true);
            engine.state.next_active_slot_offset =
                engine.schedule.next_active_slot_offset(engine.ledger.slot_offset());
            info!("Started as root of the network");
        }
        engine.publish_status();

        Ok(engine)
    }

    /// Run the state machine for an interrupt
    pub fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::NewSlot => {
                self.debug.num_new_slot = self.debug.num_new_slot.wrapping_add(1);
                self.new_slot();
            }
            RadioEvent::Compare => {
                self.debug.num_compare = self.debug.num_compare.wrapping_add(1);
                self.compare_fired();
            }
            RadioEvent::StartOfFrame(captured) => {
                self.debug.num_start_of_frame = self.debug.num_start_of_frame.wrapping_add(1);
                self.start_of_frame(captured);
            }
            RadioEvent::EndOfFrame(captured) => {
                self.debug.num_end_of_frame = self.debug.num_end_of_frame.wrapping_add(1);
                self.end_of_frame(captured);
            }
        }

        self.publish_status();
    }

    pub fn slot_state(&self) -> SlotState {
        self.state.slot_state
    }

    pub fn is_synchronized(&self) -> bool {
        self.state.is_sync
    }

    pub fn asn(&self) -> Asn {
        self.ledger.asn()
    }

    pub fn ledger(&self) -> &AsnLedger {
        &self.ledger
    }

    pub fn stats(&self) -> &MacStats {
        &self.stats
    }

    pub fn debug_counters(&self) -> &DebugCounters {
        &self.debug
    }

    /// The correction applied at the last resynchronization
    pub fn time_correction(&self) -> Duration {
        self.state.time_correction
    }

    pub fn next_active_slot_offset(&self) -> Option<SlotOffset> {
        self.state.next_active_slot_offset
    }

    pub fn desync_timeout(&self) -> u16 {
        self.state.desync_timeout
    }

    /// The channel the radio was last tuned to
    pub fn channel(&self) -> Channel {
        self.state.channel
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn schedule(&self) -> &S {
        &self.schedule
    }

    pub fn schedule_mut(&mut self) -> &mut S {
        &mut self.schedule
    }

    pub fn neighborhood_mut(&mut self) -> &mut N {
        &mut self.neighborhood
    }

    fn new_slot(&mut self) {
        self.state.slot_accounted = false;

        if let Some(single_channel) = self.handler.take_single_channel() {
            debug!("Single channel set to {:?}", single_channel);
            self.hopper.set_single_channel(single_channel);
            self.state.single_channel_changed = true;
        }

        if !self.state.is_sync {
            self.carry_radio_on_time();
            self.radio.set_timer_period(self.state.sync_slot_length);
            self.state.sync_slot_length = SLOT_DURATION;

            let result = self.synchronize_new_slot();
            self.abort_on_fault(result);
            return;
        }

        self.radio.set_timer_period(SLOT_DURATION);
        self.state.single_channel_changed = false;

        let result = self.start_slot();
        self.abort_on_fault(result);
    }

    /// Decide what to do with the slot that just started
    fn start_slot(&mut self) -> Result<(), SlotFault<R::Error>> {
        self.ledger.advance();
        let slot_offset = self.ledger.slot_offset();

        if !self.config.is_dag_root {
            self.state.desync_timeout = self.state.desync_timeout.saturating_sub(1);
            if self.state.desync_timeout == 0 {
                self.change_is_sync(false);
                self.stats.num_de_sync = self.stats.num_de_sync.wrapping_add(1);
                return Err(SlotFault::Desynchronized { slot_offset });
            }
        }

        if self.state.slot_state != SlotState::Sleeping {
            return Err(SlotFault::WrongState {
                event: RadioEvent::NewSlot,
                state: self.state.slot_state,
                slot_offset,
            });
        }

        if self.state.next_active_slot_offset != Some(slot_offset) {
            self.end_slot();
            return Ok(());
        }

        self.schedule.advance_slot();
        self.state.next_active_slot_offset = self.schedule.next_active_slot_offset(slot_offset);

        let cell_type = self.schedule.cell_type(slot_offset);
        self.state.cell_type = cell_type;
        self.state.channel_offset = self.schedule.channel_offset(slot_offset);

        let to_send = match cell_type {
            CellType::Beacon => {
                if self.roll_dice() {
                    self.originate_beacon();
                }
                self.handler.take_beacon()
            }
            CellType::TxRx if self.roll_dice() => self.handler.take_data(),
            CellType::TxRx => None,
            CellType::Tx => self.handler.take_data(),
            CellType::Rx => None,
            CellType::Idle => {
                return Err(SlotFault::WrongCellType {
                    cell_type,
                    slot_offset,
                })
            }
        };

        match to_send {
            None => self.start_rx(),
            Some(packet) => self.start_tx(packet),
        }

        Ok(())
    }

    /// Whether a shared cell is used for sending this time
    fn roll_dice(&mut self) -> bool {
        (self.config.rng.next_u32() as u16) % self.config.average_degree == 0
    }

    /// Queue a beacon for the network to synchronize to
    fn originate_beacon(&mut self) {
        if !self.state.is_sync {
            return;
        }
        let Some(rank) = self.neighborhood.rank() else {
            return;
        };
        if self.handler.has_beacon_queued() {
            return;
        }

        let Some(mut packet) = self.pool.acquire(Component::Mac) else {
            warn!("No buffer to originate a beacon");
            return;
        };

        let payload = self.neighborhood.beacon_payload();
        let beacon = Beacon {
            source: self.neighborhood.address(),
            sync_counter: payload.sync_counter,
            rank,
            // Patched right before sending
            asn: self.ledger.asn(),
            payload_info: payload.payload_info,
        };

        if packet.write_frame(Frame::Beacon(beacon)).is_err() {
            self.pool.release(packet);
            return;
        }

        if let Err(packet) = self.handler.enqueue(packet) {
            debug!("Transmit queue full, beacon skipped");
            self.pool.release(packet);
        }
    }

    fn compare_fired(&mut self) {
        let slot_offset = self.ledger.slot_offset();

        let result = match self.state.slot_state {
            SlotState::TxOffset => self.tx_prepare(),
            SlotState::TxPrepare => Err(SlotFault::WatchdogExpired {
                watchdog: Watchdog::TxDataPrepare,
                slot_offset,
            }),
            SlotState::TxReady => self.tx_send(),
            SlotState::TxDelay => Err(SlotFault::WatchdogExpired {
                watchdog: Watchdog::RadioTx,
                slot_offset,
            }),
            SlotState::Transmitting => Err(SlotFault::WatchdogExpired {
                watchdog: Watchdog::TxDataDuration,
                slot_offset,
            }),
            SlotState::RxOffset => self.rx_prepare(),
            SlotState::RxPrepare => Err(SlotFault::WatchdogExpired {
                watchdog: Watchdog::RxDataPrepare,
                slot_offset,
            }),
            SlotState::RxReady => self.rx_listen(),
            SlotState::RxListening => {
                // Nothing on the air
                self.end_slot();
                Ok(())
            }
            SlotState::Receiving => Err(SlotFault::WatchdogExpired {
                watchdog: Watchdog::RxDataDuration,
                slot_offset,
            }),
            state => Err(SlotFault::WrongState {
                event: RadioEvent::Compare,
                state,
                slot_offset,
            }),
        };

        self.abort_on_fault(result);
    }

    fn start_of_frame(&mut self, captured: Instant) {
        if self.config.trace_slot_timing {
            trace!(
                "Start of frame {} in slot {}, {:?}",
                captured,
                self.ledger.slot_offset(),
                self.state.slot_state
            );
        }

        if !self.state.is_sync {
            self.synchronize_start_of_frame(captured);
            return;
        }

        let result = match self.state.slot_state {
            SlotState::TxDelay => self.tx_started(captured),
            SlotState::RxReady | SlotState::RxListening => self.rx_started(captured),
            state => Err(SlotFault::WrongState {
                event: RadioEvent::StartOfFrame(captured),
                state,
                slot_offset: self.ledger.slot_offset(),
            }),
        };

        self.abort_on_fault(result);
    }

    fn end_of_frame(&mut self, captured: Instant) {
        if self.config.trace_slot_timing {
            trace!(
                "End of frame {} in slot {}, {:?}",
                captured,
                self.ledger.slot_offset(),
                self.state.slot_state
            );
        }

        let result = if !self.state.is_sync {
            self.synchronize_end_of_frame(captured)
        } else {
            match self.state.slot_state {
                SlotState::Transmitting => self.tx_done(captured),
                SlotState::Receiving => self.rx_done(captured),
                state => Err(SlotFault::WrongState {
                    event: RadioEvent::EndOfFrame(captured),
                    state,
                    slot_offset: self.ledger.slot_offset(),
                }),
            }
        };

        self.abort_on_fault(result);
    }

    fn abort_on_fault(&mut self, result: Result<(), SlotFault<R::Error>>) {
        if let Err(fault) = result {
            error!("Slot {} aborted: {}", self.ledger.slot_offset(), fault);
            self.end_slot();
        }
    }

    fn change_is_sync(&mut self, is_sync: bool) {
        self.state.is_sync = is_sync;

        if is_sync {
            self.stats.reset();
        }
    }

    fn publish_status(&self) {
        self.handler.publish(MacStatus {
            asn: self.ledger.asn(),
            slot_offset: self.ledger.slot_offset(),
            is_synchronized: self.state.is_sync,
            time_correction: self.state.time_correction,
            stats: self.stats,
        });
    }
}
