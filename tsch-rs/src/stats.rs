//! Counters the MAC keeps for observation only. Nothing reads them back to make decisions.

use crate::time::Duration;

/// Synchronization and duty cycle statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct MacStats {
    /// Frames we resynchronized on
    pub num_sync_pkt: u32,
    /// Acknowledgements we resynchronized on
    pub num_sync_ack: u32,
    pub min_correction: Duration,
    pub max_correction: Duration,
    /// Times the synchronization was lost. Survives [MacStats::reset].
    pub num_de_sync: u32,
    pub num_ticks_on: u32,
    pub num_ticks_total: u32,
}

impl MacStats {
    const INITIAL_MIN_CORRECTION: Duration = Duration::from_ticks(127);
    const INITIAL_MAX_CORRECTION: Duration = Duration::from_ticks(-127);

    pub const fn new() -> Self {
        Self {
            num_sync_pkt: 0,
            num_sync_ack: 0,
            min_correction: Self::INITIAL_MIN_CORRECTION,
            max_correction: Self::INITIAL_MAX_CORRECTION,
            num_de_sync: 0,
            num_ticks_on: 0,
            num_ticks_total: 0,
        }
    }

    /// Start over after (re)joining the network
    pub fn reset(&mut self) {
        *self = Self {
            num_de_sync: self.num_de_sync,
            ..Self::new()
        };
    }

    pub fn record_sync_packet(&mut self, correction: Duration) {
        self.num_sync_pkt = self.num_sync_pkt.wrapping_add(1);
        self.min_correction = self.min_correction.min(correction);
        self.max_correction = self.max_correction.max(correction);
    }

    /// Account for a finished slot.
    ///
    /// Once the window grows past `window_limit` both sums are halved, so the
    /// ratio keeps following recent behavior.
    pub fn record_slot(&mut self, radio_on: Duration, slot_length: Duration, window_limit: u32) {
        self.num_ticks_on = self.num_ticks_on.saturating_add(radio_on.as_period());
        self.num_ticks_total = self.num_ticks_total.saturating_add(slot_length.as_period());

        if self.num_ticks_total > window_limit {
            self.num_ticks_on /= 2;
            self.num_ticks_total /= 2;
        }
    }

    /// The fraction of time the radio was on, between 0 and 1
    pub fn duty_cycle(&self) -> f32 {
        if self.num_ticks_total == 0 {
            return 0.0;
        }
        self.num_ticks_on as f32 / self.num_ticks_total as f32
    }
}

impl Default for MacStats {
    fn default() -> Self {
        Self::new()
    }
}

/// How often each interrupt reached the MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct DebugCounters {
    pub num_new_slot: u32,
    pub num_compare: u32,
    pub num_start_of_frame: u32,
    pub num_end_of_frame: u32,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn halves_past_the_window() {
        let mut stats = MacStats::new();
        let limit = 10_000;

        stats.record_slot(Duration::from_ticks(100), Duration::from_ticks(491), limit);
        while stats.num_ticks_total <= limit - 491 {
            stats.record_slot(Duration::from_ticks(100), Duration::from_ticks(491), limit);
        }
        let before = stats.duty_cycle();
        let (on, total) = (stats.num_ticks_on, stats.num_ticks_total);

        stats.record_slot(Duration::from_ticks(100), Duration::from_ticks(491), limit);

        assert_eq!(stats.num_ticks_on, (on + 100) / 2);
        assert_eq!(stats.num_ticks_total, (total + 491) / 2);
        assert!(stats.num_ticks_total <= limit);
        assert!((stats.duty_cycle() - before).abs() < 0.001);
    }

    #[test]
    fn corrections_and_reset() {
        let mut stats = MacStats::new();
        stats.record_sync_packet(Duration::from_ticks(-3));
        stats.record_sync_packet(Duration::from_ticks(2));
        stats.num_de_sync = 4;
        stats.num_ticks_on = 9;

        assert_eq!(stats.num_sync_pkt, 2);
        assert_eq!(stats.min_correction, Duration::from_ticks(-3));
        assert_eq!(stats.max_correction, Duration::from_ticks(2));

        stats.reset();
        assert_eq!(
            stats,
            MacStats {
                num_de_sync: 4,
                ..MacStats::new()
            }
        );
        assert_eq!(stats.duty_cycle(), 0.0);
    }
}
