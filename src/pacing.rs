use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A frame rate in Hz, always within `FrameRate::MIN..=FrameRate::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct FrameRate(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRate {
    #[error("Frame rate must be at least {}", FrameRate::MIN)]
    TooLow(i64),
    #[error("Frame rate cannot exceed {}", FrameRate::MAX)]
    TooHigh(i64),
}

impl FrameRate {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 60;

    pub fn new(rate: i64) -> Result<Self, InvalidRate> {
        if rate < Self::MIN as i64 {
            return Err(InvalidRate::TooLow(rate));
        }
        if rate > Self::MAX as i64 {
            return Err(InvalidRate::TooHigh(rate));
        }
        Ok(Self(rate as u32))
    }

    /// For rates known at compile time; panics (at compile time in const
    /// contexts) when out of range.
    pub const fn constant(rate: u32) -> Self {
        assert!(rate >= Self::MIN && rate <= Self::MAX);
        Self(rate)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Duration of one frame at this rate.
    pub fn period(self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.0 as u64)
    }
}

impl TryFrom<i64> for FrameRate {
    type Error = InvalidRate;

    fn try_from(rate: i64) -> Result<Self, Self::Error> {
        Self::new(rate)
    }
}

impl From<FrameRate> for u32 {
    fn from(rate: FrameRate) -> Self {
        rate.0
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fps", self.0)
    }
}

/// Target rate shared between the control plane and a running worker.
///
/// Writers go through [`FrameRate`], so a reader never observes a value
/// outside the valid range.
#[derive(Debug, Clone)]
pub struct SharedFrameRate(Arc<AtomicU32>);

impl SharedFrameRate {
    pub fn new(initial: FrameRate) -> Self {
        Self(Arc::new(AtomicU32::new(initial.get())))
    }

    pub fn load(&self) -> FrameRate {
        FrameRate(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, rate: FrameRate) {
        self.0.store(rate.get(), Ordering::Release);
    }
}

/// How long to sleep so that one iteration which began at `work_started`
/// lasts one period of `target`. Zero when the work already overran.
pub fn pace_delay(target: FrameRate, work_started: Instant) -> Duration {
    pace_delay_at(target, work_started, Instant::now())
}

pub fn pace_delay_at(target: FrameRate, work_started: Instant, now: Instant) -> Duration {
    target
        .period()
        .saturating_sub(now.saturating_duration_since(work_started))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_rate_in_range() {
        for rate in 1..=60 {
            assert_eq!(FrameRate::new(rate).unwrap().get(), rate as u32);
        }
    }

    #[test]
    fn rejects_rates_out_of_range() {
        assert_eq!(FrameRate::new(0), Err(InvalidRate::TooLow(0)));
        assert_eq!(FrameRate::new(-5), Err(InvalidRate::TooLow(-5)));
        assert_eq!(FrameRate::new(61), Err(InvalidRate::TooHigh(61)));
        assert_eq!(
            InvalidRate::TooLow(0).to_string(),
            "Frame rate must be at least 1"
        );
        assert_eq!(
            InvalidRate::TooHigh(61).to_string(),
            "Frame rate cannot exceed 60"
        );
    }

    #[test]
    fn delay_covers_the_rest_of_the_period() {
        let started = Instant::now();
        let rate = FrameRate::new(10).unwrap();
        let delay = pace_delay_at(rate, started, started + Duration::from_millis(30));
        assert_eq!(delay, Duration::from_millis(70));
    }

    #[test]
    fn delay_is_zero_when_work_overran() {
        let started = Instant::now();
        let rate = FrameRate::new(30).unwrap();
        let delay = pace_delay_at(rate, started, started + Duration::from_millis(500));
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn delay_is_a_full_period_for_instant_work() {
        let started = Instant::now();
        let rate = FrameRate::new(5).unwrap();
        assert_eq!(pace_delay_at(rate, started, started), Duration::from_millis(200));
    }

    #[test]
    fn shared_rate_is_visible_to_clones() {
        let shared = SharedFrameRate::new(FrameRate::new(30).unwrap());
        let reader = shared.clone();
        shared.store(FrameRate::new(12).unwrap());
        assert_eq!(reader.load().get(), 12);
    }

    #[test]
    fn deserializes_through_validation() {
        let rate: FrameRate = serde_json::from_str("25").unwrap();
        assert_eq!(rate.get(), 25);
        assert!(serde_json::from_str::<FrameRate>("0").is_err());
        assert!(serde_json::from_str::<FrameRate>("120").is_err());
    }
}
