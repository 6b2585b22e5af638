use core::cell::Cell;

use critical_section::Mutex;

use crate::packet::{Component, Packet};

/// A pool of packet buffers shared by the MAC and the layers above it.
///
/// Buffers are moved out on [BufferPool::acquire] and must come back through
/// [BufferPool::release] once the last owner is done with them.
pub trait BufferPool {
    /// Take a buffer out of the pool. Returns `None` when the pool is exhausted.
    fn acquire(&self, owner: Component) -> Option<Packet>;

    /// Give a buffer back
    fn release(&self, packet: Packet);
}

/// A pool that hands out at most `N` packets at the same time.
///
/// It can be used from interrupt context.
pub struct PacketPool<const N: usize> {
    in_use: Mutex<Cell<usize>>,
}

impl<const N: usize> PacketPool<N> {
    pub const fn new() -> Self {
        Self {
            in_use: Mutex::new(Cell::new(0)),
        }
    }

    /// Number of packets that can still be acquired
    pub fn available(&self) -> usize {
        N - self.in_use()
    }

    pub fn in_use(&self) -> usize {
        critical_section::with(|cs| self.in_use.borrow(cs).get())
    }
}

impl<const N: usize> Default for PacketPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BufferPool for PacketPool<N> {
    fn acquire(&self, owner: Component) -> Option<Packet> {
        critical_section::with(|cs| {
            let in_use = self.in_use.borrow(cs);
            if in_use.get() >= N {
                return None;
            }
            in_use.set(in_use.get() + 1);
            Some(Packet::new(owner))
        })
    }

    fn release(&self, packet: Packet) {
        drop(packet);
        critical_section::with(|cs| {
            let in_use = self.in_use.borrow(cs);
            in_use.set(in_use.get().saturating_sub(1));
        });
    }
}
