use crate::wire::ShortAddress;

/// What the MAC needs to know about the nodes around it.
///
/// The answers come from the routing and topology layers above the MAC.
pub trait Neighborhood {
    /// The short address of this node
    fn address(&self) -> ShortAddress;

    /// Whether frames from this sender should be accepted at all
    fn is_acceptable(&self, source: ShortAddress) -> bool;

    /// Whether this sender is the node we keep our clock aligned to
    fn is_preferred_parent(&self, source: ShortAddress) -> bool;

    /// Our routing rank, or `None` while we have not joined the routing tree.
    /// Nodes without a rank do not send beacons.
    fn rank(&self) -> Option<u8>;

    /// The opaque beacon fields
    fn beacon_payload(&self) -> BeaconPayload {
        BeaconPayload::default()
    }
}

/// Beacon fields that the MAC passes along without interpreting them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct BeaconPayload {
    pub sync_counter: u8,
    pub payload_info: u8,
}

/// A fixed topology: a list of allowed neighbors and one preferred parent.
///
/// An empty allow list accepts everyone.
#[derive(Debug, Clone)]
pub struct StaticNeighborhood<const N: usize> {
    pub address: ShortAddress,
    pub allowed: heapless::Vec<ShortAddress, N>,
    pub preferred_parent: Option<ShortAddress>,
    pub rank: Option<u8>,
    pub beacon_payload: BeaconPayload,
}

impl<const N: usize> StaticNeighborhood<N> {
    pub fn new(address: ShortAddress) -> Self {
        Self {
            address,
            allowed: heapless::Vec::new(),
            preferred_parent: None,
            rank: None,
            beacon_payload: BeaconPayload::default(),
        }
    }

    /// A node at the root of the routing tree
    pub fn root(address: ShortAddress) -> Self {
        Self {
            rank: Some(0),
            ..Self::new(address)
        }
    }

    /// A node that follows `parent`
    pub fn child_of(address: ShortAddress, parent: ShortAddress) -> Self {
        Self {
            preferred_parent: Some(parent),
            ..Self::new(address)
        }
    }
}

impl<const N: usize> Neighborhood for StaticNeighborhood<N> {
    fn address(&self) -> ShortAddress {
        self.address
    }

    fn is_acceptable(&self, source: ShortAddress) -> bool {
        source != self.address && (self.allowed.is_empty() || self.allowed.contains(&source))
    }

    fn is_preferred_parent(&self, source: ShortAddress) -> bool {
        self.preferred_parent == Some(source)
    }

    fn rank(&self) -> Option<u8> {
        self.rank
    }

    fn beacon_payload(&self) -> BeaconPayload {
        self.beacon_payload
    }
}
