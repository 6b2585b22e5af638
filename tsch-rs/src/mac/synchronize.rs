//! Joining the network and keeping the slot boundaries aligned with it

use byte::TryRead;
use rand_core::RngCore;

use super::{MacEngine, RejectReason, SlotFault, SlotState};
use crate::{
    consts::{LENGTH_CRC, RESYNCHRONIZATION_GUARD, SLOT_DURATION, TX_OFFSET},
    neighborhood::Neighborhood,
    packet::Packet,
    pool::BufferPool,
    radio::{Radio, RadioEvent},
    schedule::Schedule,
    time::Instant,
    wire::{Beacon, Frame},
};

impl<R, S, N, P, Rng> MacEngine<'_, R, S, N, P, Rng>
where
    R: Radio,
    S: Schedule,
    N: Neighborhood,
    P: BufferPool,
    Rng: RngCore,
{
    /// Keep listening for beacons, slowly hopping over the beacon channels
    pub(super) fn synchronize_new_slot(&mut self) -> Result<(), SlotFault<R::Error>> {
        self.state.join_channel_changing_counter = (self.state.join_channel_changing_counter + 1)
            % self.config.eb_slow_hopping_period.max(1);

        if self.state.slot_state == SlotState::SyncReceiving {
            // A frame is coming in across the slot boundary
            return Ok(());
        }

        if self.state.slot_state != SlotState::SyncListening {
            self.state.slot_state = SlotState::SyncListening;
            self.radio_off()?;
            self.state.channel = self.hopper.single_channel().unwrap_or(self.scan_channel);
            self.start_scanning()?;
        } else if self.state.join_channel_changing_counter == 0 {
            let beacon_sequence = self.hopper.beacon_sequence();
            if let Some(position) = beacon_sequence.position_of(self.state.channel) {
                self.state.channel = beacon_sequence.channel_at(position as u16 + 1);
                debug!("Scanning on {}", self.state.channel);
                self.radio_off()?;
                self.start_scanning()?;
            }
        }

        if self.state.single_channel_changed {
            self.state.single_channel_changed = false;
            self.state.channel = self.hopper.single_channel().unwrap_or(self.scan_channel);
            debug!("Scanning on {}", self.state.channel);
            self.radio_off()?;
            self.start_scanning()?;
        }

        self.ledger.advance();
        Ok(())
    }

    fn start_scanning(&mut self) -> Result<(), SlotFault<R::Error>> {
        self.radio.set_frequency(self.state.channel)?;
        self.radio.rx_enable()?;
        self.state.radio_on_since = Some(self.radio.timer_value());
        self.radio.rx_now()?;
        Ok(())
    }

    pub(super) fn synchronize_start_of_frame(&mut self, captured: Instant) {
        if self.state.slot_state != SlotState::SyncListening {
            return;
        }

        self.state.slot_state = SlotState::SyncReceiving;
        self.state.last_captured_time = captured;
        self.state.sync_captured_time = captured;
    }

    /// Take the network's ASN and slot boundary from a beacon
    pub(super) fn synchronize_end_of_frame(
        &mut self,
        captured: Instant,
    ) -> Result<(), SlotFault<R::Error>> {
        if self.state.slot_state != SlotState::SyncReceiving {
            return Err(SlotFault::WrongState {
                event: RadioEvent::EndOfFrame(captured),
                state: self.state.slot_state,
                slot_offset: self.ledger.slot_offset(),
            });
        }

        self.state.slot_state = SlotState::SyncProcessing;
        self.state.last_captured_time = captured;

        let mut packet = self.receive_packet()?;

        let beacon = match self.validate_beacon(&mut packet) {
            Ok(beacon) => beacon,
            Err(reason) => {
                if reason == RejectReason::TooLate {
                    // Stretch the slot so the next beacon lands well inside it
                    self.state.sync_slot_length = SLOT_DURATION * 25 / 10;
                }
                trace!("Not synchronizing on frame: {:?}", reason);
                self.pool.release(packet);
                self.state.slot_state = SlotState::SyncListening;
                return Ok(());
            }
        };

        // Goes up from end_slot if anything below fails
        self.state.data_received = Some(packet);

        self.radio_off()?;

        self.ledger.sync_from_beacon(beacon.asn_bytes());
        let slot_offset = self.ledger.slot_offset();
        self.schedule.sync_slot_offset(slot_offset);
        self.state.next_active_slot_offset = self.schedule.next_active_slot_offset(slot_offset);

        let beacon_sequence = self.hopper.beacon_sequence();
        if let Some(position) = beacon_sequence.position_of(self.state.channel) {
            let len = beacon_sequence.len();
            let channel_offset = self.schedule.channel_offset(slot_offset) % len;
            self.ledger
                .adopt_beacon_phase((position + len - channel_offset) % len);
        }

        self.synchronize_packet(self.state.sync_captured_time);
        self.change_is_sync(true);

        info!(
            "Synchronized to {:?} at ASN {} (slot offset {}), correction {}",
            beacon.source,
            self.ledger.asn(),
            slot_offset,
            self.state.time_correction
        );

        if let Some(packet) = self.state.data_received.take() {
            self.notify_receive(packet);
        }

        self.end_slot();
        Ok(())
    }

    fn validate_beacon(&self, packet: &mut Packet) -> Result<Beacon, RejectReason> {
        let length = packet.data.len();
        if length != Beacon::LENGTH + LENGTH_CRC {
            return Err(RejectReason::Length(length));
        }

        if !packet.crc_valid {
            return Err(RejectReason::Crc);
        }

        packet.data.truncate(Beacon::LENGTH);

        let beacon = match Frame::try_read(&packet.data, ()) {
            Ok((Frame::Beacon(beacon), _)) => beacon,
            Ok(_) => return Err(RejectReason::FrameType),
            Err(_) => return Err(RejectReason::Malformed),
        };

        if !self.neighborhood.is_acceptable(beacon.source) {
            return Err(RejectReason::Topology(beacon.source));
        }

        let time_left = SLOT_DURATION - self.state.sync_captured_time.since_slot_start();
        if time_left < RESYNCHRONIZATION_GUARD {
            return Err(RejectReason::TooLate);
        }

        Ok(beacon)
    }

    /// Align the slot boundary with a frame from the time source.
    ///
    /// The frame was sent at [TX_OFFSET] on the sender's clock, any difference
    /// is applied to the length of the running slot.
    pub(super) fn synchronize_packet(&mut self, captured: Instant) {
        let correction = captured.since_slot_start() - TX_OFFSET;

        self.radio.set_timer_period(SLOT_DURATION + correction);
        self.state.desync_timeout = self.config.desync_timeout;
        self.state.time_correction = correction;

        if self.state.is_sync && correction.abs() > self.config.large_time_correction {
            warn!(
                "Large time correction of {} in slot {}",
                correction,
                self.ledger.slot_offset()
            );
        }

        self.stats.record_sync_packet(correction);
    }
}
