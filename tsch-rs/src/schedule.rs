use crate::{
    asn::{Asn, SlotOffset},
    wire::ShortAddress,
};

/// What a node does in a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum CellType {
    /// Nothing scheduled, the radio stays off
    #[default]
    Idle,
    /// Dedicated transmit cell
    Tx,
    /// Dedicated receive cell
    Rx,
    /// Shared cell: transmit when there is something to send, else listen
    TxRx,
    /// Shared cell carrying the enhanced beacons
    Beacon,
}

/// The slot-type schedule the MAC consults every active slot.
///
/// The MAC only reads from it, apart from the statistics hooks.
pub trait Schedule {
    /// The cell type at the given offset
    fn cell_type(&self, slot_offset: SlotOffset) -> CellType;

    /// The channel offset of the cell at the given offset
    fn channel_offset(&self, slot_offset: SlotOffset) -> u8;

    /// The first active slot offset after the given one, wrapping around the slotframe.
    /// Returns `None` when no cell is active.
    fn next_active_slot_offset(&self, slot_offset: SlotOffset) -> Option<SlotOffset>;

    /// Called when the MAC starts an active slot
    fn advance_slot(&mut self) {}

    /// Called when the MAC (re)learns its position in the slotframe
    fn sync_slot_offset(&mut self, _slot_offset: SlotOffset) {}

    /// A transmission in the cell of this ASN finished
    fn indicate_tx(&mut self, asn: &Asn, success: bool);

    /// A frame was received in the cell of this ASN
    fn indicate_rx(&mut self, asn: &Asn);
}

/// A cell of the slotframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct CellDescriptor {
    pub slot_offset: SlotOffset,
    pub channel_offset: u8,
    pub cell_type: CellType,
    pub neighbor: Option<ShortAddress>,
}

/// Usage counters of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct CellUsage {
    pub num_tx: u16,
    pub num_tx_success: u16,
    pub num_rx: u16,
    pub last_used: Asn,
}

/// A fixed table of cells repeating every slotframe
#[derive(Debug, Clone)]
pub struct SlotframeSchedule<const N: usize> {
    length: u16,
    cells: heapless::Vec<(CellDescriptor, CellUsage), N>,
}

impl<const N: usize> SlotframeSchedule<N> {
    pub fn new(length: u16) -> Self {
        Self {
            length: length.max(1),
            cells: heapless::Vec::new(),
        }
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    /// Add a cell, replacing any cell at the same offset.
    ///
    /// The cell is given back when it is outside the slotframe or the table is full.
    pub fn add_cell(&mut self, cell: CellDescriptor) -> Result<(), CellDescriptor> {
        if cell.slot_offset >= self.length {
            return Err(cell);
        }

        if let Some(existing) = self.find_mut(cell.slot_offset) {
            *existing = (cell, CellUsage::default());
            return Ok(());
        }

        let position = self
            .cells
            .iter()
            .position(|(c, _)| c.slot_offset > cell.slot_offset)
            .unwrap_or(self.cells.len());

        self.cells
            .insert(position, (cell, CellUsage::default()))
            .map_err(|(cell, _)| cell)
    }

    pub fn remove_cell(&mut self, slot_offset: SlotOffset) -> Option<CellDescriptor> {
        let position = self
            .cells
            .iter()
            .position(|(c, _)| c.slot_offset == slot_offset)?;
        Some(self.cells.remove(position).0)
    }

    pub fn cells(&self) -> impl Iterator<Item = &CellDescriptor> {
        self.cells.iter().map(|(c, _)| c)
    }

    pub fn usage(&self, slot_offset: SlotOffset) -> Option<&CellUsage> {
        self.cells
            .iter()
            .find(|(c, _)| c.slot_offset == slot_offset)
            .map(|(_, u)| u)
    }

    fn find(&self, slot_offset: SlotOffset) -> Option<&CellDescriptor> {
        self.cells
            .iter()
            .find(|(c, _)| c.slot_offset == slot_offset)
            .map(|(c, _)| c)
    }

    fn find_mut(&mut self, slot_offset: SlotOffset) -> Option<&mut (CellDescriptor, CellUsage)> {
        self.cells.iter_mut().find(|(c, _)| c.slot_offset == slot_offset)
    }

    fn usage_at(&mut self, asn: &Asn) -> Option<&mut CellUsage> {
        let slot_offset = (asn.as_u64() % self.length as u64) as SlotOffset;
        self.find_mut(slot_offset).map(|(_, u)| u)
    }
}

impl<const N: usize> Schedule for SlotframeSchedule<N> {
    fn cell_type(&self, slot_offset: SlotOffset) -> CellType {
        self.find(slot_offset).map(|c| c.cell_type).unwrap_or_default()
    }

    fn channel_offset(&self, slot_offset: SlotOffset) -> u8 {
        self.find(slot_offset).map(|c| c.channel_offset).unwrap_or(0)
    }

    fn next_active_slot_offset(&self, slot_offset: SlotOffset) -> Option<SlotOffset> {
        let mut active = self
            .cells
            .iter()
            .map(|(c, _)| c)
            .filter(|c| c.cell_type != CellType::Idle);

        let first = active.clone().next()?;

        Some(
            active
                .find(|c| c.slot_offset > slot_offset)
                .unwrap_or(first)
                .slot_offset,
        )
    }

    fn indicate_tx(&mut self, asn: &Asn, success: bool) {
        if let Some(usage) = self.usage_at(asn) {
            usage.num_tx = usage.num_tx.saturating_add(1);
            if success {
                usage.num_tx_success = usage.num_tx_success.saturating_add(1);
            }
            usage.last_used = *asn;
        }
    }

    fn indicate_rx(&mut self, asn: &Asn) {
        if let Some(usage) = self.usage_at(asn) {
            usage.num_rx = usage.num_rx.saturating_add(1);
            usage.last_used = *asn;
        }
    }
}
