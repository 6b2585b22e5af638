//! The receive activity

use byte::TryRead;
use rand_core::RngCore;

use super::{MacEngine, RejectReason, SlotFault, SlotState};
use crate::{
    consts::{
        DELAY_RX, LENGTH_CRC, LONG_GUARD_TIME, MAX_PHY_PACKET_SIZE, MAX_RX_DATA_PREPARE,
        MIN_FRAME_LENGTH, TX_OFFSET, WD_DATA_DURATION,
    },
    fmt::Bytes,
    neighborhood::Neighborhood,
    packet::{Component, Packet},
    pool::BufferPool,
    radio::{Radio, ReceivedFrameInfo},
    schedule::Schedule,
    time::{Duration, Instant},
    wire::{Frame, FrameType, ShortAddress},
};

/// When to start tuning the radio
const RX_PREPARE_AT: Duration = Duration::from_ticks(
    TX_OFFSET.ticks() - LONG_GUARD_TIME.ticks() - DELAY_RX.ticks() - MAX_RX_DATA_PREPARE.ticks(),
);
/// When to start listening, a guard time before the frame is expected
const RX_LISTEN_AT: Duration =
    Duration::from_ticks(TX_OFFSET.ticks() - LONG_GUARD_TIME.ticks() - DELAY_RX.ticks());
/// When to give up on hearing anything
const RX_GIVE_UP_AT: Duration = Duration::from_ticks(TX_OFFSET.ticks() + LONG_GUARD_TIME.ticks());

impl<R, S, N, P, Rng> MacEngine<'_, R, S, N, P, Rng>
where
    R: Radio,
    S: Schedule,
    N: Neighborhood,
    P: BufferPool,
    Rng: RngCore,
{
    /// Nothing to send: wait until it's time to listen
    pub(super) fn start_rx(&mut self) {
        self.state.slot_state = SlotState::RxOffset;
        self.radio.schedule_compare(Instant::SLOT_START + RX_PREPARE_AT);
    }

    pub(super) fn rx_prepare(&mut self) -> Result<(), SlotFault<R::Error>> {
        self.state.slot_state = SlotState::RxPrepare;

        self.state.channel = self.hopper.compute_channel(
            &self.ledger,
            self.state.cell_type,
            self.state.channel_offset,
        );
        self.radio.set_frequency(self.state.channel)?;
        self.radio.rx_enable()?;
        self.state.radio_on_since = Some(self.radio.timer_value());

        self.radio.schedule_compare(Instant::SLOT_START + RX_LISTEN_AT);
        self.state.slot_state = SlotState::RxReady;

        Ok(())
    }

    pub(super) fn rx_listen(&mut self) -> Result<(), SlotFault<R::Error>> {
        self.state.slot_state = SlotState::RxListening;
        self.radio.rx_now()?;
        self.radio.schedule_compare(Instant::SLOT_START + RX_GIVE_UP_AT);

        Ok(())
    }

    pub(super) fn rx_started(&mut self, captured: Instant) -> Result<(), SlotFault<R::Error>> {
        self.state.slot_state = SlotState::Receiving;
        self.radio.cancel_compare();
        self.state.last_captured_time = captured;
        self.state.sync_captured_time = captured;
        self.radio.schedule_compare(captured + WD_DATA_DURATION);

        Ok(())
    }

    pub(super) fn rx_done(&mut self, captured: Instant) -> Result<(), SlotFault<R::Error>> {
        self.state.slot_state = SlotState::TxAckOffset;
        self.radio.cancel_compare();
        self.radio_off()?;
        self.state.last_captured_time = captured;

        let mut packet = self.receive_packet()?;

        let source = match validate_frame(&mut packet, &self.neighborhood) {
            Ok(source) => source,
            Err(reason) => {
                trace!("Dropped frame in slot {}: {:?}", self.ledger.slot_offset(), reason);
                self.pool.release(packet);
                self.end_slot();
                return Ok(());
            }
        };

        trace!("Received from {:?}: {}", source, Bytes(&packet.data));
        self.state.data_received = Some(packet);

        if !self.config.is_dag_root && self.neighborhood.is_preferred_parent(source) {
            self.synchronize_packet(self.state.sync_captured_time);
        }

        if let Some(packet) = self.state.data_received.take() {
            self.notify_receive(packet);
        }

        self.end_slot();
        Ok(())
    }

    /// Get the frame out of the radio into a fresh buffer
    pub(super) fn receive_packet(&mut self) -> Result<Packet, SlotFault<R::Error>> {
        let mut packet = self
            .pool
            .acquire(Component::Mac)
            .ok_or(SlotFault::NoFreeBuffer)?;

        match self.radio.get_received_frame(&mut packet.data) {
            Ok(ReceivedFrameInfo {
                rssi,
                lqi,
                crc_valid,
            }) => {
                packet.rssi = rssi;
                packet.lqi = lqi;
                packet.crc_valid = crc_valid;
                Ok(packet)
            }
            Err(e) => {
                self.pool.release(packet);
                Err(e.into())
            }
        }
    }
}

/// Check a received frame and strip its check sequence
fn validate_frame<N: Neighborhood>(
    packet: &mut Packet,
    neighborhood: &N,
) -> Result<ShortAddress, RejectReason> {
    let length = packet.data.len();
    if !(MIN_FRAME_LENGTH..=MAX_PHY_PACKET_SIZE).contains(&length) {
        return Err(RejectReason::Length(length));
    }

    packet.data.truncate(length - LENGTH_CRC);

    if !packet.crc_valid {
        return Err(RejectReason::Crc);
    }

    if FrameType::peek(&packet.data).is_none() {
        return Err(RejectReason::FrameType);
    }

    let (frame, _) = Frame::try_read(&packet.data, ()).map_err(|_| RejectReason::Malformed)?;
    let source = frame.source();

    if !neighborhood.is_acceptable(source) {
        return Err(RejectReason::Topology(source));
    }

    Ok(source)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{neighborhood::StaticNeighborhood, wire::DataFrame};

    fn received(frame: Frame<'_>, crc_valid: bool) -> Packet {
        let mut packet = Packet::new(Component::Mac);
        packet.write_frame(frame).unwrap();
        packet.data.extend_from_slice(&[0xaa, 0xbb]).unwrap();
        packet.crc_valid = crc_valid;
        packet
    }

    #[test]
    fn pipeline() {
        let neighborhood = StaticNeighborhood::<1>::child_of(ShortAddress(2), ShortAddress(1));
        let frame = Frame::Data(DataFrame {
            source: ShortAddress(1),
            payload: b"hello",
        });

        let mut packet = received(frame, true);
        assert_eq!(validate_frame(&mut packet, &neighborhood), Ok(ShortAddress(1)));
        assert_eq!(packet.data.len(), DataFrame::HEADER_LENGTH + 5);

        let mut packet = received(frame, false);
        assert_eq!(validate_frame(&mut packet, &neighborhood), Err(RejectReason::Crc));

        let mut packet = Packet::new(Component::Mac);
        packet.data.push(0).unwrap();
        assert_eq!(validate_frame(&mut packet, &neighborhood), Err(RejectReason::Length(1)));

        let mut packet = Packet::new(Component::Mac);
        packet.data.extend_from_slice(&[0x12, 0x34, 1, 0, 0, 0]).unwrap();
        packet.crc_valid = true;
        assert_eq!(validate_frame(&mut packet, &neighborhood), Err(RejectReason::FrameType));

        let mut packet = Packet::new(Component::Mac);
        packet.data.extend_from_slice(&[0x0b, 0xeb, 1, 0, 0, 0]).unwrap();
        packet.crc_valid = true;
        assert_eq!(validate_frame(&mut packet, &neighborhood), Err(RejectReason::Malformed));

        let own = Frame::Data(DataFrame {
            source: ShortAddress(2),
            payload: &[],
        });
        let mut packet = received(own, true);
        assert_eq!(
            validate_frame(&mut packet, &neighborhood),
            Err(RejectReason::Topology(ShortAddress(2)))
        );
    }
}
