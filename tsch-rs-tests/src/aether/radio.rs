use std::{
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard},
};

use tsch_rs::{
    consts::{LENGTH_CRC, MAX_PHY_PACKET_SIZE},
    hopping::Channel,
    radio::{Radio, ReceivedFrameInfo},
    time::{Duration, Instant},
};

use super::{AetherInner, Node, NodeId, RadioState};

/// Signal strength reported for every frame
const RSSI: i8 = -50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimRadioError {
    /// The node was powered off
    PoweredOff,
    /// Sending without a tuned and enabled transmitter
    NotReadyToSend,
    FrameTooLong(usize),
    NothingReceived,
}

impl Display for SimRadioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl core::error::Error for SimRadioError {}

/// A radio connected to an [super::Aether]
pub struct SimRadio {
    pub(super) inner: Arc<Mutex<AetherInner>>,
    pub(super) node_id: NodeId,
}

impl SimRadio {
    pub fn node_id(&self) -> NodeId {
        self.node_id.clone()
    }

    fn inner(&self) -> MutexGuard<AetherInner> {
        self.inner.lock().unwrap()
    }

    fn with_node<T>(&self, f: impl FnOnce(&mut Node) -> T) -> T {
        let mut aether = self.inner();
        let node = aether
            .nodes
            .get_mut(&self.node_id)
            .expect("radios are never removed from the aether");
        f(node)
    }

    fn with_powered_node<T>(
        &mut self,
        f: impl FnOnce(&mut Node) -> Result<T, SimRadioError>,
    ) -> Result<T, SimRadioError> {
        self.with_node(|node| {
            if !node.powered {
                return Err(SimRadioError::PoweredOff);
            }
            f(node)
        })
    }
}

impl Radio for SimRadio {
    type Error = SimRadioError;

    fn set_frequency(&mut self, channel: Channel) -> Result<(), Self::Error> {
        self.with_powered_node(|node| {
            node.channel = Some(channel);
            Ok(())
        })
    }

    fn rx_enable(&mut self) -> Result<(), Self::Error> {
        self.with_powered_node(|node| {
            node.state = RadioState::RxEnabled;
            Ok(())
        })
    }

    fn rx_now(&mut self) -> Result<(), Self::Error> {
        self.with_powered_node(|node| {
            node.state = RadioState::Listening;
            Ok(())
        })
    }

    fn load_packet(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.with_powered_node(|node| {
            // The check sequence is added on the air
            let frame = &data[..data.len().saturating_sub(LENGTH_CRC)];
            node.tx_buffer = heapless::Vec::from_slice(frame)
                .map_err(|_| SimRadioError::FrameTooLong(data.len()))?;
            Ok(())
        })
    }

    fn tx_enable(&mut self) -> Result<(), Self::Error> {
        self.with_powered_node(|node| {
            node.state = RadioState::TxEnabled;
            Ok(())
        })
    }

    fn tx_now(&mut self) -> Result<(), Self::Error> {
        let node_id = self.node_id.clone();
        self.inner()
            .send(&node_id)
            .ok_or(SimRadioError::NotReadyToSend)
    }

    fn rf_off(&mut self) -> Result<(), Self::Error> {
        let node_id = self.node_id.clone();
        let mut aether = self.inner();
        aether.abort_transmissions_from(&node_id);
        if let Some(node) = aether.nodes.get_mut(&node_id) {
            node.state = RadioState::Off;
        }
        Ok(())
    }

    fn get_received_frame(
        &mut self,
        buffer: &mut heapless::Vec<u8, MAX_PHY_PACKET_SIZE>,
    ) -> Result<ReceivedFrameInfo, Self::Error> {
        self.with_powered_node(|node| {
            let frame = node.rx_buffer.take().ok_or(SimRadioError::NothingReceived)?;
            *buffer = frame;
            Ok(ReceivedFrameInfo {
                rssi: RSSI,
                lqi: u8::MAX,
                crc_valid: true,
            })
        })
    }

    fn timer_value(&self) -> Instant {
        self.with_node(|node| Instant::from_ticks(node.counter))
    }

    fn timer_period(&self) -> Duration {
        self.with_node(|node| Duration::from_ticks(node.period as i32))
    }

    fn set_timer_period(&mut self, period: Duration) {
        self.with_node(|node| node.period = period.as_period().max(1));
    }

    fn schedule_compare(&mut self, at: Instant) {
        self.with_node(|node| node.compare = Some(at.ticks()));
    }

    fn cancel_compare(&mut self) {
        self.with_node(|node| node.compare = None);
    }
}
