use core::{
    fmt::Display,
    ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign},
};

/// The slot timer runs off the 32 kHz low-power crystal
pub const TICKS_PER_SECOND: u32 = 32768;

/// A value of the slot timer.
///
/// The slot timer restarts from zero at every slot boundary, so an instant
/// is always relative to the start of the slot it was captured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Instant {
    ticks: u32,
}

impl Instant {
    /// The slot boundary itself
    pub const SLOT_START: Self = Self::from_ticks(0);

    pub const fn from_ticks(ticks: u32) -> Self {
        Self { ticks }
    }

    pub const fn ticks(&self) -> u32 {
        self.ticks
    }

    /// The signed distance from `other` to `self`
    #[must_use]
    pub const fn duration_since(&self, other: Self) -> Duration {
        let diff = self.ticks as i64 - other.ticks as i64;

        if diff > i32::MAX as i64 {
            Duration::from_ticks(i32::MAX)
        } else if diff < i32::MIN as i64 {
            Duration::from_ticks(i32::MIN)
        } else {
            Duration::from_ticks(diff as i32)
        }
    }

    /// The time since the slot boundary
    #[must_use]
    pub const fn since_slot_start(&self) -> Duration {
        self.duration_since(Self::SLOT_START)
    }

    #[must_use]
    pub const fn checked_add_duration(self, duration: Duration) -> Option<Self> {
        match self.ticks.checked_add_signed(duration.ticks) {
            Some(ticks) => Some(Self { ticks }),
            None => None,
        }
    }

    /// Adds the duration, clamping at the start of the slot or at the timer maximum.
    #[must_use]
    pub const fn saturating_add_duration(self, duration: Duration) -> Self {
        Self {
            ticks: self.ticks.saturating_add_signed(duration.ticks),
        }
    }
}

impl Display for Instant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "@{}", self.ticks)
    }
}

#[cfg(feature = "defmt-03")]
impl defmt::Format for Instant {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "@{}", self.ticks)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add_duration(rhs)
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Self::Output {
        self.saturating_add_duration(-rhs)
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Self::Output {
        self.duration_since(rhs)
    }
}

/// A signed span of slot timer ticks.
///
/// Time corrections are negative when a frame arrived earlier than expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Duration {
    ticks: i32,
}

impl Display for Duration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ticks ({}us)", self.ticks, self.micros())
    }
}

#[cfg(feature = "defmt-03")]
impl defmt::Format for Duration {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{} ticks ({}us)", self.ticks, self.micros())
    }
}

impl Duration {
    pub const ZERO: Self = Self::from_ticks(0);

    pub const fn from_ticks(ticks: i32) -> Self {
        Self { ticks }
    }

    /// Converts from microseconds, rounding towards zero like the timer hardware does
    pub const fn from_micros(micros: i32) -> Self {
        Self::from_ticks((micros as i64 * TICKS_PER_SECOND as i64 / 1_000_000) as i32)
    }

    pub const fn ticks(&self) -> i32 {
        self.ticks
    }

    /// The amount of *full* microseconds in this duration, rounded towards zero.
    pub const fn micros(&self) -> i64 {
        self.ticks as i64 * 1_000_000 / TICKS_PER_SECOND as i64
    }

    /// The duration as a timer period. Negative durations make no sense as a period.
    pub const fn as_period(&self) -> u32 {
        if self.ticks < 0 {
            0
        } else {
            self.ticks as u32
        }
    }

    #[must_use]
    pub const fn checked_add(self, duration: Duration) -> Option<Self> {
        match self.ticks.checked_add(duration.ticks) {
            Some(ticks) => Some(Self { ticks }),
            None => None,
        }
    }

    #[must_use]
    pub const fn checked_sub(self, duration: Duration) -> Option<Self> {
        match self.ticks.checked_sub(duration.ticks) {
            Some(ticks) => Some(Self { ticks }),
            None => None,
        }
    }

    #[must_use]
    pub const fn abs(self) -> Self {
        Self {
            ticks: self.ticks.saturating_abs(),
        }
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Self::Output {
        Self {
            ticks: self.ticks.saturating_add(rhs.ticks),
        }
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self {
            ticks: self.ticks.saturating_sub(rhs.ticks),
        }
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Duration) {
        *self = *self - rhs;
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Self::Output {
        Self {
            ticks: self.ticks.saturating_neg(),
        }
    }
}

impl Mul<i32> for Duration {
    type Output = Duration;

    fn mul(self, rhs: i32) -> Self::Output {
        Self {
            ticks: self.ticks.saturating_mul(rhs),
        }
    }
}

impl Mul<Duration> for i32 {
    type Output = Duration;

    fn mul(self, rhs: Duration) -> Self::Output {
        rhs * self
    }
}

impl Div<i32> for Duration {
    type Output = Duration;

    fn div(self, rhs: i32) -> Self::Output {
        Self {
            ticks: self.ticks.checked_div(rhs).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_since() {
        assert_eq!(
            Instant::from_ticks(0).duration_since(Instant::from_ticks(5)),
            Duration::from_ticks(-5)
        );
        assert_eq!(
            Instant::from_ticks(136).duration_since(Instant::from_ticks(131)),
            Duration::from_ticks(5)
        );
        assert_eq!(
            Instant::from_ticks(u32::MAX).since_slot_start(),
            Duration::from_ticks(i32::MAX)
        );
    }

    #[test]
    fn add() {
        assert_eq!(
            Instant::from_ticks(0) + Duration::from_ticks(5),
            Instant::from_ticks(5)
        );
        assert_eq!(
            Instant::from_ticks(10) + Duration::from_ticks(-5),
            Instant::from_ticks(5)
        );
        assert_eq!(
            Instant::from_ticks(3) + Duration::from_ticks(-5),
            Instant::SLOT_START
        );
        assert_eq!(
            Duration::from_ticks(10) + Duration::from_ticks(-5),
            Duration::from_ticks(5)
        );
    }

    #[test]
    fn sub() {
        assert_eq!(
            Instant::from_ticks(10) - Duration::from_ticks(5),
            Instant::from_ticks(5)
        );
        assert_eq!(
            Instant::from_ticks(10) - Instant::from_ticks(15),
            Duration::from_ticks(-5)
        );
        assert_eq!(
            Duration::from_ticks(491) - Duration::from_ticks(131),
            Duration::from_ticks(360)
        );
    }

    #[test]
    fn mul_div() {
        assert_eq!(Duration::from_ticks(491) * 25 / 10, Duration::from_ticks(1227));
        assert_eq!(2 * Duration::from_ticks(-3), Duration::from_ticks(-6));
        assert_eq!(Duration::from_ticks(7) / 0, Duration::ZERO);
    }

    #[test]
    fn micros() {
        assert_eq!(Duration::from_micros(15_000), Duration::from_ticks(491));
        assert_eq!(Duration::from_micros(4_000), Duration::from_ticks(131));
        assert_eq!(Duration::from_ticks(32768).micros(), 1_000_000);
        assert_eq!(Duration::from_ticks(-5).as_period(), 0);
    }
}
