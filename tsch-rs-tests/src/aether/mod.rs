//! Radio simulation infrastructure
//!
//! This module provides a simulated [Aether](https://en.wikipedia.org/wiki/Luminiferous_aether) to connect several radios.
//! Time advances in slot timer ticks and only when [Aether::tick] is called, so a
//! simulation is fully deterministic.
//!
//! # Example
//! ```
//! use tsch_rs::{hopping::Channel, radio::Radio};
//! use tsch_rs_tests::aether::Aether;
//!
//! let mut aether = Aether::new();
//! let mut alice = aether.radio();
//! let mut bob = aether.radio();
//! let channel = Channel::new(15).unwrap();
//!
//! bob.set_frequency(channel).unwrap();
//! bob.rx_enable().unwrap();
//! bob.rx_now().unwrap();
//!
//! alice.set_frequency(channel).unwrap();
//! alice.load_packet(b"Hello!\0\0").unwrap();
//! alice.tx_enable().unwrap();
//! alice.tx_now().unwrap();
//!
//! for _ in 0..50 {
//!     aether.tick();
//! }
//!
//! let mut buffer = heapless::Vec::new();
//! bob.get_received_frame(&mut buffer).unwrap();
//! assert_eq!(&buffer[..6], b"Hello!");
//! ```

use core::fmt::Debug;
use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{Seek, Write},
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use pcap_file::{
    pcapng::{
        blocks::{
            enhanced_packet::EnhancedPacketBlock,
            interface_description::{InterfaceDescriptionBlock, InterfaceDescriptionOption},
        },
        Block, PcapNgReader, PcapNgWriter,
    },
    DataLink,
};
use tsch_rs::{
    consts::{DELAY_TX, LENGTH_CRC, MAX_PHY_PACKET_SIZE, SLOT_DURATION},
    hopping::Channel,
    radio::RadioEvent,
    time::{Instant, TICKS_PER_SECOND},
};

mod radio;

pub use radio::{SimRadio, SimRadioError};

/// The frames are not 802.15.4, so the trace uses a private link type
const TRACE_LINK_TYPE: DataLink = DataLink::USER0;

/// A medium to which radios are connected
///
/// This takes care of routing the frames to the right radios and of running the
/// slot timer of every radio.
pub struct Aether {
    inner: Arc<Mutex<AetherInner>>,
}

impl Aether {
    /// Create a new empty aether
    pub fn new() -> Self {
        let inner = AetherInner {
            now: 0,
            nodes: Default::default(),
            in_flight: Vec::new(),
            next_transmission: 0,
            pcap_trace: None,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Create a radio which lives in the Aether.
    ///
    /// Its slot timer starts counting at the next tick.
    pub fn radio(&mut self) -> SimRadio {
        let node = Node {
            powered: true,
            counter: 0,
            period: SLOT_DURATION.as_period(),
            compare: None,
            channel: None,
            state: RadioState::Off,
            tx_buffer: heapless::Vec::new(),
            rx_buffer: None,
        };
        let inner = Arc::clone(&self.inner);
        let node_id = NodeId::new();

        let old = self.inner().nodes.insert(node_id.clone(), node);
        assert!(old.is_none(), "node_id must be unique");

        SimRadio { inner, node_id }
    }

    /// The number of ticks since the aether was created
    pub fn now(&self) -> u64 {
        self.inner().now
    }

    /// Advance time by one tick.
    ///
    /// Returns the events the radios raise in this tick, in the order they must
    /// be handed to their MAC engines.
    pub fn tick(&mut self) -> Vec<(NodeId, RadioEvent)> {
        self.inner().tick()
    }

    /// Cut the power of a node: its timer stops and it no longer sends or receives
    pub fn power_off(&mut self, node_id: &NodeId) {
        let mut inner = self.inner();
        inner.abort_transmissions_from(node_id);
        if let Some(node) = inner.nodes.get_mut(node_id) {
            node.powered = false;
            node.state = RadioState::Off;
        }
    }

    pub fn start_trace(&mut self, name: &str) {
        self.inner().start_trace(name);
    }

    pub fn stop_trace(&mut self) -> File {
        self.inner().stop_trace()
    }

    /// The frames in a trace, in the order they went on the air
    pub fn parse_trace(&mut self, file: File) -> impl Iterator<Item = Vec<u8>> {
        let mut reader = PcapNgReader::new(file).unwrap();
        let mut current_data_link = TRACE_LINK_TYPE;

        std::iter::from_fn(move || {
            while let Some(b) = reader.next_block() {
                let block = b.unwrap();

                match block {
                    Block::InterfaceDescription(interface_description_block) => {
                        current_data_link = interface_description_block.linktype
                    }
                    Block::EnhancedPacket(enhanced_packet_block) => {
                        if current_data_link != TRACE_LINK_TYPE {
                            continue;
                        }
                        return Some(enhanced_packet_block.data.to_vec());
                    }
                    _ => continue,
                }
            }

            None
        })
    }

    fn inner(&self) -> MutexGuard<AetherInner> {
        self.inner.lock().unwrap()
    }
}

impl Default for Aether {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AetherInner {
    now: u64,
    nodes: BTreeMap<NodeId, Node>,
    in_flight: Vec<Transmission>,
    next_transmission: u64,
    pcap_trace: Option<(PcapNgWriter<File>, HashMap<NodeId, u32>)>,
}

impl Debug for AetherInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("AetherInner")
            .field("now", &self.now)
            .field("nodes", &self.nodes)
            .field("in_flight", &self.in_flight)
            .field("pcap_dump", &self.pcap_trace.as_ref().map(|(_, h)| ((), h)))
            .finish()
    }
}

impl AetherInner {
    pub fn start_trace(&mut self, name: &str) {
        if self.pcap_trace.is_some() {
            panic!("Already capturing pcap");
        }

        let output_folder = std::env::temp_dir().join("tsch-rs-test-output");
        if !output_folder.exists() {
            std::fs::create_dir_all(&output_folder).unwrap();
        }

        let trace_file_path: PathBuf = output_folder.join(name).with_extension("pcap");

        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .read(true)
            .open(&trace_file_path)
            .unwrap();

        log::info!("Writing aether trace to: {}", trace_file_path.display());

        self.pcap_trace = Some((PcapNgWriter::new(file).unwrap(), HashMap::new()));
    }

    /// Stops the trace and returns the file handle that was written to
    pub fn stop_trace(&mut self) -> File {
        let (trace_file, _) = self.pcap_trace.take().expect("No trace in progress");
        let mut file = trace_file.into_inner();
        file.seek(std::io::SeekFrom::Start(0)).unwrap();
        file.flush().unwrap();

        file
    }

    fn trace(&mut self, transmission: &Transmission) {
        let Some((pcap, nodes)) = &mut self.pcap_trace else {
            return;
        };

        let node_id = &transmission.from;
        let len = nodes.len();
        let interface_id = *nodes.entry(node_id.clone()).or_insert_with(|| {
            pcap.write_pcapng_block(InterfaceDescriptionBlock {
                linktype: TRACE_LINK_TYPE,
                snaplen: MAX_PHY_PACKET_SIZE as u32,
                options: vec![InterfaceDescriptionOption::IfName(
                    format!("{node_id:?}").into(),
                )],
            })
            .unwrap();

            len as u32
        });

        let block = EnhancedPacketBlock {
            interface_id,
            timestamp: core::time::Duration::from_micros(
                self.now * 1_000_000 / TICKS_PER_SECOND as u64,
            ),
            original_len: transmission.data.len().try_into().unwrap(),
            data: Cow::Borrowed(transmission.data.as_ref()),
            options: vec![],
        };
        pcap.write_pcapng_block(block).unwrap();
    }

    fn tick(&mut self) -> Vec<(NodeId, RadioEvent)> {
        self.now += 1;
        let now = self.now;
        let mut events = Vec::new();

        for (id, node) in self.nodes.iter_mut().filter(|(_, node)| node.powered) {
            node.counter += 1;
            if node.counter >= node.period {
                node.counter = 0;
                events.push((id.clone(), RadioEvent::NewSlot));
            }
            if node.compare == Some(node.counter) {
                node.compare = None;
                events.push((id.clone(), RadioEvent::Compare));
            }
        }

        let starting: Vec<Transmission> = self
            .in_flight
            .iter()
            .filter(|t| t.start_at == now)
            .cloned()
            .collect();

        for transmission in &starting {
            self.trace(transmission);

            for (id, node) in self.nodes.iter_mut().filter(|(_, node)| node.powered) {
                let captured = Instant::from_ticks(node.counter);
                if *id == transmission.from {
                    events.push((id.clone(), RadioEvent::StartOfFrame(captured)));
                } else if node.state == RadioState::Listening
                    && node.channel == Some(transmission.channel)
                {
                    node.state = RadioState::Receiving(transmission.id);
                    events.push((id.clone(), RadioEvent::StartOfFrame(captured)));
                }
            }
        }

        let (ending, in_flight) = self
            .in_flight
            .drain(..)
            .partition::<Vec<_>, _>(|t| t.end_at == now);
        self.in_flight = in_flight;

        for transmission in ending {
            for (id, node) in self.nodes.iter_mut().filter(|(_, node)| node.powered) {
                let captured = Instant::from_ticks(node.counter);
                if node.state == RadioState::Transmitting(transmission.id) {
                    node.state = RadioState::Idle;
                    events.push((id.clone(), RadioEvent::EndOfFrame(captured)));
                } else if node.state == RadioState::Receiving(transmission.id) {
                    let mut frame = transmission.data.clone();
                    // The simulated check sequence is always valid
                    let _ = frame.extend_from_slice(&[0; LENGTH_CRC]);
                    node.rx_buffer = Some(frame);
                    // The receiver keeps listening after a frame
                    node.state = RadioState::Listening;
                    events.push((id.clone(), RadioEvent::EndOfFrame(captured)));
                }
            }
        }

        events
    }

    fn send(&mut self, from: &NodeId) -> Option<()> {
        let node = self.nodes.get_mut(from)?;
        if !node.powered || node.state != RadioState::TxEnabled {
            return None;
        }
        let channel = node.channel?;

        let id = self.next_transmission;
        self.next_transmission += 1;
        node.state = RadioState::Transmitting(id);

        let start_at = self.now + DELAY_TX.ticks() as u64;
        self.in_flight.push(Transmission {
            id,
            from: from.clone(),
            channel,
            data: node.tx_buffer.clone(),
            start_at,
            end_at: start_at + airtime(node.tx_buffer.len()),
        });

        Some(())
    }

    fn abort_transmissions_from(&mut self, from: &NodeId) {
        let aborted: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|t| t.from == *from)
            .map(|t| t.id)
            .collect();
        self.in_flight.retain(|t| t.from != *from);

        for node in self.nodes.values_mut() {
            if let RadioState::Receiving(id) = node.state {
                if aborted.contains(&id) {
                    node.state = RadioState::Listening;
                }
            }
        }
    }
}

/// Ticks a frame of `len` bytes spends on the air: length byte, frame and check
/// sequence at 32 µs per byte
fn airtime(len: usize) -> u64 {
    let micros = (1 + len as u64 + LENGTH_CRC as u64) * 32;
    (micros * TICKS_PER_SECOND as u64).div_ceil(1_000_000)
}

#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Clone)]
pub struct NodeId(usize);

impl NodeId {
    fn new() -> Self {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RadioState {
    Off,
    /// Done transmitting, waiting to be turned off
    Idle,
    RxEnabled,
    Listening,
    Receiving(u64),
    TxEnabled,
    Transmitting(u64),
}

#[derive(Debug)]
pub struct Node {
    powered: bool,
    counter: u32,
    period: u32,
    compare: Option<u32>,
    channel: Option<Channel>,
    state: RadioState,
    /// The frame to send, without check sequence
    tx_buffer: heapless::Vec<u8, MAX_PHY_PACKET_SIZE>,
    /// The last frame received, with check sequence
    rx_buffer: Option<heapless::Vec<u8, MAX_PHY_PACKET_SIZE>>,
}

#[derive(Debug, Clone)]
struct Transmission {
    id: u64,
    from: NodeId,
    channel: Channel,
    data: heapless::Vec<u8, MAX_PHY_PACKET_SIZE>,
    start_at: u64,
    end_at: u64,
}

#[cfg(test)]
mod tests {
    use pcap_file::pcapng::PcapNgReader;
    use pretty_assertions::assert_eq;
    use tsch_rs::radio::Radio;

    use super::*;

    fn channel(number: u8) -> Channel {
        Channel::new(number).unwrap()
    }

    fn listen(radio: &mut SimRadio, number: u8) {
        radio.set_frequency(channel(number)).unwrap();
        radio.rx_enable().unwrap();
        radio.rx_now().unwrap();
    }

    fn send(radio: &mut SimRadio, number: u8, data: &[u8]) {
        radio.set_frequency(channel(number)).unwrap();
        radio.load_packet(data).unwrap();
        radio.tx_enable().unwrap();
        radio.tx_now().unwrap();
    }

    fn run(aether: &mut Aether, ticks: u32) -> Vec<(NodeId, RadioEvent)> {
        (0..ticks).flat_map(|_| aether.tick()).collect()
    }

    #[test_log::test]
    fn radios_are_connected() {
        let mut a = Aether::new();

        let mut alice = a.radio();
        let mut bob = a.radio();

        listen(&mut bob, 15);
        // Two bytes of room for the check sequence
        send(&mut alice, 15, &[1, 2, 3, 4, 0, 0]);

        let events = run(&mut a, 40);
        let start = Instant::from_ticks(DELAY_TX.ticks() as u32);
        let end = start + tsch_rs::time::Duration::from_ticks(airtime(4) as i32);
        assert_eq!(
            events,
            vec![
                (alice.node_id(), RadioEvent::StartOfFrame(start)),
                (bob.node_id(), RadioEvent::StartOfFrame(start)),
                (alice.node_id(), RadioEvent::EndOfFrame(end)),
                (bob.node_id(), RadioEvent::EndOfFrame(end)),
            ]
        );

        let mut buffer = heapless::Vec::new();
        let info = bob.get_received_frame(&mut buffer).unwrap();
        assert!(info.crc_valid);
        assert_eq!(&buffer[..], &[1, 2, 3, 4, 0, 0]);
    }

    #[test_log::test]
    fn ignored_if_not_listening() {
        let mut a = Aether::new();

        let mut alice = a.radio();
        let mut bob = a.radio();
        let mut carol = a.radio();

        listen(&mut bob, 16);
        carol.set_frequency(channel(15)).unwrap();
        carol.rx_enable().unwrap();
        send(&mut alice, 15, &[1, 2, 0, 0]);

        let events = run(&mut a, 40);
        assert!(events.iter().all(|(id, _)| *id == alice.node_id()));
        assert!(bob.get_received_frame(&mut heapless::Vec::new()).is_err());
        assert!(carol.get_received_frame(&mut heapless::Vec::new()).is_err());
    }

    #[test_log::test]
    fn turning_off_aborts_the_frame() {
        let mut a = Aether::new();

        let mut alice = a.radio();
        let mut bob = a.radio();

        listen(&mut bob, 15);
        send(&mut alice, 15, &[0; 100]);

        let events = run(&mut a, 30);
        assert_eq!(events.len(), 2);

        alice.rf_off().unwrap();
        assert!(run(&mut a, 200).is_empty());
        assert!(bob.get_received_frame(&mut heapless::Vec::new()).is_err());
    }

    #[test_log::test]
    fn slot_timer() {
        let mut a = Aether::new();
        let mut alice = a.radio();

        alice.set_timer_period(tsch_rs::time::Duration::from_ticks(10));
        alice.schedule_compare(Instant::from_ticks(4));

        let events = run(&mut a, 25);
        assert_eq!(
            events.iter().map(|(_, e)| *e).collect::<Vec<_>>(),
            vec![
                RadioEvent::Compare,
                RadioEvent::NewSlot,
                RadioEvent::NewSlot
            ]
        );
        assert_eq!(alice.timer_value(), Instant::from_ticks(5));

        a.power_off(&alice.node_id());
        assert!(run(&mut a, 25).is_empty());
        assert_eq!(alice.timer_value(), Instant::from_ticks(5));
    }

    #[test_log::test]
    fn log_frames() {
        let written = {
            let mut a = Aether::new();
            a.start_trace("log_frames");
            let mut alice = a.radio();
            let mut bob = a.radio();

            send(&mut alice, 15, b"Hello!\0\0");
            send(&mut bob, 20, b"Hello!\0\0");
            run(&mut a, 40);

            a.stop_trace()
        };

        let mut reader = PcapNgReader::new(written).unwrap();

        let mut blocks = vec![];
        while let Some(b) = reader.next_block() {
            blocks.push(b.unwrap().into_owned());
        }

        assert_eq!(blocks.len(), 4);

        let int0 = blocks[0].clone().into_interface_description().unwrap();
        assert_eq!(int0.linktype, TRACE_LINK_TYPE);
        assert_eq!(int0.snaplen, 127);

        let data0 = blocks[1].clone().into_enhanced_packet().unwrap();
        assert_eq!(data0.interface_id, 0);
        assert_eq!(&data0.data[..], b"Hello!");

        let int1 = blocks[2].clone().into_interface_description().unwrap();
        assert_ne!(int0, int1);

        let data1 = blocks[3].clone().into_enhanced_packet().unwrap();
        assert_eq!(data1.interface_id, 1);
        assert_eq!(&data1.data[..], b"Hello!");
    }
}
