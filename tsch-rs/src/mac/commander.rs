use core::cell::{Cell, RefCell};

use arraydeque::ArrayDeque;
use critical_section::Mutex;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

use crate::{
    asn::{Asn, SlotOffset},
    consts::{LENGTH_CRC, MAX_PHY_PACKET_SIZE, NOTIFICATION_QUEUE_SIZE, TX_QUEUE_SIZE},
    hopping,
    packet::{Component, Packet},
    stats::MacStats,
    time::Duration,
    ConfigError,
};

/// How a transmission ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SendOutcome {
    Success,
    /// The retry budget ran out
    Fail,
}

/// A message from the MAC to the layer above it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A submitted packet is done with, successfully or not
    SendDone {
        packet: Packet,
        outcome: SendOutcome,
    },
    /// A frame was received. Beacons are passed up as well.
    Receive(Packet),
}

impl Notification {
    pub fn packet(&self) -> &Packet {
        match self {
            Notification::SendDone { packet, .. } => packet,
            Notification::Receive(packet) => packet,
        }
    }

    pub fn into_packet(self) -> Packet {
        match self {
            Notification::SendDone { packet, .. } => packet,
            Notification::Receive(packet) => packet,
        }
    }
}

/// A snapshot of the MAC state, refreshed after every interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct MacStatus {
    pub asn: Asn,
    pub slot_offset: SlotOffset,
    pub is_synchronized: bool,
    pub time_correction: Duration,
    pub stats: MacStats,
}

/// The main interface to the MAC layer.
///
/// The MAC engine runs in interrupt context, the upper layer in a task. Everything shared
/// between the two lives here and is only touched inside short critical sections.
pub struct MacCommander {
    notifications: Channel<CriticalSectionRawMutex, Notification, NOTIFICATION_QUEUE_SIZE>,
    tx_queue: Mutex<RefCell<ArrayDeque<Packet, TX_QUEUE_SIZE>>>,
    status: Mutex<Cell<MacStatus>>,
    pending_single_channel: Mutex<Cell<Option<Option<hopping::Channel>>>>,
}

impl MacCommander {
    /// Create a new instance
    pub fn new() -> Self {
        Self {
            notifications: Channel::new(),
            tx_queue: Mutex::new(RefCell::new(ArrayDeque::new())),
            status: Mutex::new(Cell::new(MacStatus::default())),
            pending_single_channel: Mutex::new(Cell::new(None)),
        }
    }

    /// Queue a packet for transmission in one of the next transmit cells.
    ///
    /// The packet is given back if the queue is full or the frame is too long to be sent.
    /// Its fate is reported with a [Notification::SendDone].
    pub fn submit(&self, mut packet: Packet) -> Result<(), Packet> {
        if packet.data.len() > MAX_PHY_PACKET_SIZE - LENGTH_CRC {
            return Err(packet);
        }

        packet.owner = Component::UpperToMac;
        critical_section::with(|cs| {
            self.tx_queue
                .borrow_ref_mut(cs)
                .push_back(packet)
                .map_err(|e| e.element)
        })
    }

    /// Number of packets waiting for a transmit cell
    pub fn queued(&self) -> usize {
        critical_section::with(|cs| self.tx_queue.borrow_ref(cs).len())
    }

    /// Wait until the MAC has something to tell.
    /// This API is cancel-safe.
    pub async fn wait_for_notification(&self) -> Notification {
        let mut notification = self.notifications.receive().await;
        Self::take_over(&mut notification);
        notification
    }

    /// Get the next notification, if any
    pub fn try_notification(&self) -> Option<Notification> {
        let mut notification = self.notifications.try_receive().ok()?;
        Self::take_over(&mut notification);
        Some(notification)
    }

    fn take_over(notification: &mut Notification) {
        match notification {
            Notification::SendDone { packet, .. } | Notification::Receive(packet) => {
                packet.owner = Component::Upper
            }
        }
    }

    /// The latest state published by the MAC
    pub fn status(&self) -> MacStatus {
        critical_section::with(|cs| self.status.borrow(cs).get())
    }

    pub fn asn(&self) -> Asn {
        self.status().asn
    }

    pub fn is_synchronized(&self) -> bool {
        self.status().is_synchronized
    }

    pub fn stats(&self) -> MacStats {
        self.status().stats
    }

    /// The number of slots between `earlier` and the current ASN.
    /// See [Asn::difference] for when this is `None`.
    pub fn asn_diff(&self, earlier: &Asn) -> Option<u32> {
        critical_section::with(|cs| self.status.borrow(cs).get().asn.difference(earlier))
    }

    /// Use a single channel for all non-beacon cells, or `0` to go back to channel hopping.
    /// It takes effect from the next slot on.
    pub fn set_single_channel(&self, channel: u8) -> Result<(), ConfigError> {
        let setting = hopping::Channel::single_channel_setting(channel)?;
        critical_section::with(|cs| self.pending_single_channel.borrow(cs).set(Some(setting)));
        Ok(())
    }

    /// Get the inverse of the commander, used by the MAC engine.
    pub(crate) fn get_handler(&self) -> MacHandler<'_> {
        MacHandler { commander: self }
    }
}

impl Default for MacCommander {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct MacHandler<'a> {
    commander: &'a MacCommander,
}

impl MacHandler<'_> {
    /// Hand a notification to the upper layer, giving it back when the queue is full
    pub fn notify(&self, notification: Notification) -> Result<(), Notification> {
        self.commander
            .notifications
            .try_send(notification)
            .map_err(|embassy_sync::channel::TrySendError::Full(n)| n)
    }

    /// Take the oldest queued beacon
    pub fn take_beacon(&self) -> Option<Packet> {
        self.take_first(Packet::is_beacon)
    }

    /// Take the oldest queued packet that is not a beacon
    pub fn take_data(&self) -> Option<Packet> {
        self.take_first(|p| !p.is_beacon())
    }

    pub fn has_beacon_queued(&self) -> bool {
        critical_section::with(|cs| {
            self.commander
                .tx_queue
                .borrow_ref(cs)
                .iter()
                .any(Packet::is_beacon)
        })
    }

    /// Queue a packet the MAC created itself
    pub fn enqueue(&self, packet: Packet) -> Result<(), Packet> {
        critical_section::with(|cs| {
            self.commander
                .tx_queue
                .borrow_ref_mut(cs)
                .push_back(packet)
                .map_err(|e| e.element)
        })
    }

    /// Put a packet back at the head of the queue for another attempt
    pub fn requeue(&self, packet: Packet) -> Result<(), Packet> {
        critical_section::with(|cs| {
            self.commander
                .tx_queue
                .borrow_ref_mut(cs)
                .push_front(packet)
                .map_err(|e| e.element)
        })
    }

    pub fn publish(&self, status: MacStatus) {
        critical_section::with(|cs| self.commander.status.borrow(cs).set(status));
    }

    /// A single channel setting made since the last call
    pub fn take_single_channel(&self) -> Option<Option<hopping::Channel>> {
        critical_section::with(|cs| self.commander.pending_single_channel.borrow(cs).take())
    }

    fn take_first(&self, predicate: impl Fn(&Packet) -> bool) -> Option<Packet> {
        critical_section::with(|cs| {
            let mut queue = self.commander.tx_queue.borrow_ref_mut(cs);
            let index = queue.iter().position(predicate)?;
            queue.remove(index)
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::wire::{Beacon, DataFrame, Frame, ShortAddress};

    fn data_packet(payload: &[u8]) -> Packet {
        let mut packet = Packet::new(Component::Upper);
        packet
            .write_frame(Frame::Data(DataFrame {
                source: ShortAddress(1),
                payload,
            }))
            .unwrap();
        packet
    }

    fn beacon_packet() -> Packet {
        let mut packet = Packet::new(Component::Mac);
        packet
            .write_frame(Frame::Beacon(Beacon {
                source: ShortAddress(1),
                sync_counter: 0,
                rank: 0,
                asn: Asn::ZERO,
                payload_info: 0,
            }))
            .unwrap();
        packet
    }

    #[test]
    fn queue_hands_out_by_kind() {
        let commander = MacCommander::new();
        let handler = commander.get_handler();

        commander.submit(data_packet(b"a")).unwrap();
        handler.enqueue(beacon_packet()).unwrap();
        commander.submit(data_packet(b"b")).unwrap();
        assert_eq!(commander.queued(), 3);
        assert!(handler.has_beacon_queued());

        let beacon = handler.take_beacon().unwrap();
        assert!(beacon.is_beacon());
        assert!(!handler.has_beacon_queued());
        assert_eq!(handler.take_beacon(), None);

        let first = handler.take_data().unwrap();
        assert_eq!(first, data_packet(b"a").tap_owner(Component::UpperToMac));

        handler.requeue(first.clone()).unwrap();
        assert_eq!(handler.take_data(), Some(first));
        assert!(handler.take_data().is_some());
        assert_eq!(handler.take_data(), None);
    }

    #[test]
    fn full_queue_gives_packets_back() {
        let commander = MacCommander::new();
        for _ in 0..TX_QUEUE_SIZE {
            commander.submit(data_packet(b"x")).unwrap();
        }
        assert!(commander.submit(data_packet(b"y")).is_err());
        assert!(commander.get_handler().requeue(data_packet(b"z")).is_err());

        let mut long = Packet::new(Component::Upper);
        long.data.resize_default(MAX_PHY_PACKET_SIZE).unwrap();
        assert_eq!(MacCommander::new().submit(long.clone()), Err(long));
    }

    #[test]
    fn asn_diff_uses_published_asn() {
        let commander = MacCommander::new();
        commander.get_handler().publish(MacStatus {
            asn: Asn::from_u64(1000),
            ..Default::default()
        });

        assert_eq!(commander.asn_diff(&Asn::from_u64(990)), Some(10));
        assert_eq!(commander.asn_diff(&Asn::from_u64(0x01_0000_0000)), None);
        assert_eq!(commander.asn(), Asn::from_u64(1000));
        assert!(!commander.is_synchronized());
    }

    #[test]
    fn single_channel_setting() {
        let commander = MacCommander::new();
        let handler = commander.get_handler();

        assert_eq!(handler.take_single_channel(), None);
        assert_eq!(commander.set_single_channel(30), Err(ConfigError::InvalidChannel(30)));
        assert_eq!(handler.take_single_channel(), None);

        commander.set_single_channel(15).unwrap();
        assert_eq!(handler.take_single_channel(), Some(hopping::Channel::new(15)));
        assert_eq!(handler.take_single_channel(), None);

        commander.set_single_channel(0).unwrap();
        assert_eq!(handler.take_single_channel(), Some(None));
    }

    #[futures_test::test]
    async fn notifications_reach_the_upper_layer() {
        let commander = MacCommander::new();
        let handler = commander.get_handler();

        assert_eq!(commander.try_notification(), None);

        for _ in 0..NOTIFICATION_QUEUE_SIZE {
            handler.notify(Notification::Receive(data_packet(b"r"))).unwrap();
        }
        let overflow = Notification::SendDone {
            packet: data_packet(b"s"),
            outcome: SendOutcome::Fail,
        };
        assert_eq!(handler.notify(overflow.clone()), Err(overflow));

        let notification = commander.wait_for_notification().await;
        assert_eq!(notification.packet().owner, Component::Upper);
        assert!(matches!(notification, Notification::Receive(_)));
        assert!(commander.try_notification().is_some());
    }

    trait TapOwner {
        fn tap_owner(self, owner: Component) -> Self;
    }

    impl TapOwner for Packet {
        fn tap_owner(mut self, owner: Component) -> Self {
            self.owner = owner;
            self
        }
    }
}
