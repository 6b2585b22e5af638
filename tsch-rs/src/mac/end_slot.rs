use rand_core::RngCore;

use super::{
    commander::{Notification, SendOutcome},
    MacEngine, SlotState,
};
use crate::{
    neighborhood::Neighborhood,
    packet::{Component, Packet},
    pool::BufferPool,
    radio::Radio,
    schedule::Schedule,
    time::{Duration, Instant},
};

impl<R, S, N, P, Rng> MacEngine<'_, R, S, N, P, Rng>
where
    R: Radio,
    S: Schedule,
    N: Neighborhood,
    P: BufferPool,
    Rng: RngCore,
{
    /// Bring everything back to rest until the next slot.
    ///
    /// Every path through a slot ends here, including all the error paths.
    /// Calling it again in the same slot has no further effect.
    pub(super) fn end_slot(&mut self) {
        if let Err(e) = self.radio_off() {
            error!("Could not turn off the radio: {}", e);
        }
        self.radio.cancel_compare();

        self.state.last_captured_time = Instant::SLOT_START;
        self.state.sync_captured_time = Instant::SLOT_START;

        if !self.state.slot_accounted {
            self.state.slot_accounted = true;
            self.stats.record_slot(
                self.state.radio_on_ticks,
                self.radio.timer_period(),
                self.config.duty_cycle_window_limit,
            );
        }
        self.state.radio_on_ticks = Duration::ZERO;

        if let Some(mut packet) = self.state.data_to_send.take() {
            self.schedule.indicate_tx(&self.ledger.asn(), false);
            packet.retries_left = packet.retries_left.saturating_sub(1);

            if packet.retries_left == 0 {
                self.notify_send_done(packet, SendOutcome::Fail);
            } else {
                packet.owner = Component::UpperToMac;
                if let Err(packet) = self.handler.requeue(packet) {
                    warn!("Transmit queue full, giving up on a frame");
                    self.notify_send_done(packet, SendOutcome::Fail);
                }
            }
        }

        if let Some(packet) = self.state.data_received.take() {
            self.notify_receive(packet);
        }

        self.state.slot_state = SlotState::Sleeping;
    }

    /// Turn off the radio, keeping track of how long it was on
    pub(super) fn radio_off(&mut self) -> Result<(), R::Error> {
        let result = self.radio.rf_off();

        if let Some(since) = self.state.radio_on_since.take() {
            let on = self.radio.timer_value() - since;
            self.state.radio_on_ticks += on.max(Duration::ZERO);
        }

        result
    }

    /// The radio stays on over slot boundaries while scanning.
    /// Account for the slot that just ended and count on from the new slot start.
    pub(super) fn carry_radio_on_time(&mut self) {
        if let Some(since) = self.state.radio_on_since.as_mut() {
            let on = self.radio.timer_period() - since.since_slot_start();
            self.state.radio_on_ticks += on.max(Duration::ZERO);
            *since = Instant::SLOT_START;
        }
    }

    pub(super) fn notify_send_done(&mut self, mut packet: Packet, outcome: SendOutcome) {
        packet.asn = self.ledger.asn();
        packet.owner = Component::MacToUpper;
        self.notify(Notification::SendDone { packet, outcome });
    }

    pub(super) fn notify_receive(&mut self, mut packet: Packet) {
        packet.asn = self.ledger.asn();
        packet.owner = Component::MacToUpper;
        self.schedule.indicate_rx(&packet.asn);
        self.notify(Notification::Receive(packet));
    }

    fn notify(&mut self, notification: Notification) {
        if let Err(notification) = self.handler.notify(notification) {
            error!("Upper layer is not keeping up, dropping a notification");
            self.pool.release(notification.into_packet());
        }
    }
}
