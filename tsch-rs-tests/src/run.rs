use byte::TryRead;
use futures::FutureExt;
use rand::{rngs::StdRng, SeedableRng};
use tsch_rs::{
    asn::SlotOffset,
    consts::SLOT_DURATION,
    mac::{
        commander::{MacCommander, Notification, SendOutcome},
        MacConfig, MacEngine,
    },
    neighborhood::StaticNeighborhood,
    packet::{Component, Packet},
    pool::{BufferPool, PacketPool},
    schedule::{CellDescriptor, CellType, SlotframeSchedule},
    wire::{DataFrame, Frame, ShortAddress},
};

use crate::aether::{Aether, NodeId, SimRadio};

pub const POOL_SIZE: usize = 16;
pub const MAX_CELLS: usize = 16;
pub const MAX_NEIGHBORS: usize = 4;

/// The slotframe length used by the simulations, short to keep them fast
pub const SLOTFRAME_LENGTH: u16 = 11;

pub type SimEngine = MacEngine<
    'static,
    SimRadio,
    SlotframeSchedule<MAX_CELLS>,
    StaticNeighborhood<MAX_NEIGHBORS>,
    PacketPool<POOL_SIZE>,
    StdRng,
>;

/// A configuration suited for simulation: a short slotframe, a beacon in every
/// beacon cell and a quick loss of synchronization
pub fn sim_config(seed: u64, is_dag_root: bool) -> MacConfig<StdRng> {
    MacConfig {
        is_dag_root,
        slotframe_length: SLOTFRAME_LENGTH,
        average_degree: 1,
        desync_timeout: 3 * SLOTFRAME_LENGTH,
        ..MacConfig::new(StdRng::seed_from_u64(seed))
    }
}

/// A schedule with the beacon cell at slot offset 0 and the given dedicated cells
pub fn sim_schedule(cells: &[(SlotOffset, CellType)]) -> SlotframeSchedule<MAX_CELLS> {
    let mut schedule = SlotframeSchedule::new(SLOTFRAME_LENGTH);
    schedule
        .add_cell(CellDescriptor {
            slot_offset: 0,
            channel_offset: 0,
            cell_type: CellType::Beacon,
            neighbor: None,
        })
        .unwrap();

    for &(slot_offset, cell_type) in cells {
        schedule
            .add_cell(CellDescriptor {
                slot_offset,
                channel_offset: 0,
                cell_type,
                neighbor: None,
            })
            .unwrap();
    }

    schedule
}

pub const ROOT: ShortAddress = ShortAddress(1);
pub const CHILD: ShortAddress = ShortAddress(2);

/// A root and a child that boots `child_boot_delay` ticks later.
///
/// The child sends in slot offset 1 and the root in slot offset 2.
/// Returns the simulation with the indices of the root and the child.
pub fn root_and_child(child_boot_delay: u64) -> (Simulation, usize, usize) {
    let mut sim = Simulation::new();

    let root = sim.add_node(
        StaticNeighborhood::root(ROOT),
        sim_schedule(&[(1, CellType::Rx), (2, CellType::Tx)]),
        sim_config(1, true),
    );
    sim.run_ticks(child_boot_delay);
    let child = sim.add_node(
        StaticNeighborhood::child_of(CHILD, ROOT),
        sim_schedule(&[(1, CellType::Tx), (2, CellType::Rx)]),
        sim_config(2, false),
    );

    (sim, root, child)
}

/// A MAC engine with its upper layer
pub struct SimNode {
    pub node_id: NodeId,
    pub address: ShortAddress,
    pub engine: SimEngine,
    pub commander: &'static MacCommander,
    pub pool: &'static PacketPool<POOL_SIZE>,
    /// Everything the MAC reported to the upper layer, oldest first
    pub notifications: Vec<Notification>,
    powered: bool,
}

impl SimNode {
    /// Queue a data frame for transmission
    pub fn send(&self, payload: &[u8]) {
        let mut packet = self
            .pool
            .acquire(Component::Upper)
            .expect("simulation pools are large enough");
        packet
            .write_frame(Frame::Data(DataFrame {
                source: self.address,
                payload,
            }))
            .unwrap();

        if let Err(packet) = self.commander.submit(packet) {
            self.pool.release(packet);
            panic!("transmit queue of {:?} is full", self.address);
        }
    }

    /// The payloads of the data frames received so far, with the sender
    pub fn received_data(&self) -> Vec<(ShortAddress, Vec<u8>)> {
        self.notifications
            .iter()
            .filter_map(|notification| match notification {
                Notification::Receive(packet) => data_frame(packet),
                _ => None,
            })
            .collect()
    }

    /// How every transmission attempt of a data frame ended
    pub fn send_outcomes(&self) -> Vec<SendOutcome> {
        self.notifications
            .iter()
            .filter_map(|notification| match notification {
                Notification::SendDone { packet, outcome } if packet.is_data() => Some(*outcome),
                _ => None,
            })
            .collect()
    }

    pub fn is_synchronized(&self) -> bool {
        self.commander.is_synchronized()
    }
}

fn data_frame(packet: &Packet) -> Option<(ShortAddress, Vec<u8>)> {
    match Frame::try_read(&packet.data, ()) {
        Ok((Frame::Data(frame), _)) => Some((frame.source, frame.payload.to_vec())),
        _ => None,
    }
}

/// Several MAC engines sharing an [Aether], stepped one tick at a time
pub struct Simulation {
    pub aether: Aether,
    pub nodes: Vec<SimNode>,
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            aether: Aether::new(),
            nodes: Vec::new(),
        }
    }

    /// Boot a node. Returns its index in [Simulation::nodes].
    pub fn add_node(
        &mut self,
        neighborhood: StaticNeighborhood<MAX_NEIGHBORS>,
        schedule: SlotframeSchedule<MAX_CELLS>,
        config: MacConfig<StdRng>,
    ) -> usize {
        let commander: &'static MacCommander = Box::leak(Box::new(MacCommander::new()));
        let pool: &'static PacketPool<POOL_SIZE> = Box::leak(Box::new(PacketPool::new()));
        let radio = self.aether.radio();
        let node_id = radio.node_id();
        let address = tsch_rs::neighborhood::Neighborhood::address(&neighborhood);

        let engine = MacEngine::new(radio, schedule, neighborhood, pool, commander, config)
            .expect("simulation configurations are valid");

        self.nodes.push(SimNode {
            node_id,
            address,
            engine,
            commander,
            pool,
            notifications: Vec::new(),
            powered: true,
        });

        self.nodes.len() - 1
    }

    /// Advance one tick: run the radios, then the MAC engines, then the upper layers
    pub fn step(&mut self) {
        for (node_id, event) in self.aether.tick() {
            if let Some(node) = self
                .nodes
                .iter_mut()
                .find(|node| node.powered && node.node_id == node_id)
            {
                node.engine.handle_event(event);
            }
        }

        for node in &mut self.nodes {
            while let Some(notification) = node.commander.wait_for_notification().now_or_never() {
                node.notifications.push(notification.clone());
                node.pool.release(notification.into_packet());
            }
        }
    }

    pub fn run_ticks(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    pub fn run_slots(&mut self, slots: u64) {
        self.run_ticks(slots * SLOT_DURATION.ticks() as u64);
    }

    /// Step until `done` holds, for at most `max_slots` slots.
    /// Returns whether `done` was reached.
    pub fn run_until(&mut self, max_slots: u64, mut done: impl FnMut(&Self) -> bool) -> bool {
        for _ in 0..max_slots * SLOT_DURATION.ticks() as u64 {
            if done(self) {
                return true;
            }
            self.step();
        }

        done(self)
    }

    /// Stop a node dead, as if its battery ran out
    pub fn power_off(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        node.powered = false;
        self.aether.power_off(&node.node_id);
    }

    pub fn node(&self, index: usize) -> &SimNode {
        &self.nodes[index]
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}
