//! The transmit activity

use rand_core::RngCore;

use super::{commander::SendOutcome, MacEngine, SlotFault, SlotState};
use crate::{
    consts::{DELAY_TX, LENGTH_CRC, MAX_TX_DATA_PREPARE, TX_OFFSET, WD_DATA_DURATION, WD_RADIO_TX},
    neighborhood::Neighborhood,
    packet::{Component, Packet},
    pool::BufferPool,
    radio::{Radio, RadioEvent},
    schedule::{CellType, Schedule},
    time::{Duration, Instant},
    wire::Beacon,
};

/// When to start preparing the frame
const TX_PREPARE_AT: Duration =
    Duration::from_ticks(TX_OFFSET.ticks() - DELAY_TX.ticks() - MAX_TX_DATA_PREPARE.ticks());
/// When to issue the transmit command so the frame starts at [TX_OFFSET]
const TX_SEND_AT: Duration = Duration::from_ticks(TX_OFFSET.ticks() - DELAY_TX.ticks());
/// By when the radio must have started sending
const TX_STARTED_BY: Duration = Duration::from_ticks(TX_SEND_AT.ticks() + WD_RADIO_TX.ticks());

impl<R, S, N, P, Rng> MacEngine<'_, R, S, N, P, Rng>
where
    R: Radio,
    S: Schedule,
    N: Neighborhood,
    P: BufferPool,
    Rng: RngCore,
{
    /// Take on the packet for this slot and wait until it's time to prepare it
    pub(super) fn start_tx(&mut self, mut packet: Packet) {
        packet.owner = Component::Mac;

        if self.state.cell_type == CellType::Beacon
            && Beacon::write_asn(&mut packet.data, &self.ledger.asn()).is_err()
        {
            warn!("Queued beacon is too short to hold an ASN");
        }

        packet.tx_attempts = packet.tx_attempts.saturating_add(1);
        self.state.data_to_send = Some(packet);

        self.state.slot_state = SlotState::TxOffset;
        self.radio.schedule_compare(Instant::SLOT_START + TX_PREPARE_AT);
    }

    /// Load the frame and tune the radio
    pub(super) fn tx_prepare(&mut self) -> Result<(), SlotFault<R::Error>> {
        self.state.slot_state = SlotState::TxPrepare;

        let Some(packet) = &self.state.data_to_send else {
            return Err(SlotFault::WrongState {
                event: RadioEvent::Compare,
                state: SlotState::TxPrepare,
                slot_offset: self.ledger.slot_offset(),
            });
        };

        self.state.local_copy.clear();
        self.state
            .local_copy
            .extend_from_slice(&packet.data)
            .and_then(|_| self.state.local_copy.extend_from_slice(&[0; LENGTH_CRC]))
            .map_err(|_| SlotFault::FrameTooLong(packet.data.len()))?;

        self.state.channel = self.hopper.compute_channel(
            &self.ledger,
            self.state.cell_type,
            self.state.channel_offset,
        );
        self.radio.set_frequency(self.state.channel)?;
        self.radio.load_packet(&self.state.local_copy)?;
        self.radio.tx_enable()?;
        self.state.radio_on_since = Some(self.radio.timer_value());

        self.radio.schedule_compare(Instant::SLOT_START + TX_SEND_AT);
        self.state.slot_state = SlotState::TxReady;

        Ok(())
    }

    pub(super) fn tx_send(&mut self) -> Result<(), SlotFault<R::Error>> {
        self.state.slot_state = SlotState::TxDelay;
        self.radio.schedule_compare(Instant::SLOT_START + TX_STARTED_BY);
        self.radio.tx_now()?;

        Ok(())
    }

    pub(super) fn tx_started(&mut self, captured: Instant) -> Result<(), SlotFault<R::Error>> {
        self.state.slot_state = SlotState::Transmitting;
        self.radio.cancel_compare();
        self.state.last_captured_time = captured;
        self.radio.schedule_compare(captured + WD_DATA_DURATION);

        Ok(())
    }

    pub(super) fn tx_done(&mut self, captured: Instant) -> Result<(), SlotFault<R::Error>> {
        self.state.slot_state = SlotState::RxAckOffset;
        self.radio.cancel_compare();
        self.radio_off()?;
        self.state.last_captured_time = captured;

        self.schedule.indicate_tx(&self.ledger.asn(), true);
        if let Some(packet) = self.state.data_to_send.take() {
            trace!("Sent frame of {} bytes on {}", packet.data.len(), self.state.channel);
            self.notify_send_done(packet, SendOutcome::Success);
        }

        self.end_slot();
        Ok(())
    }
}
