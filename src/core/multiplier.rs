//! Multiplier Arithmetic
//!
//! The displayed multiplier is a two-decimal value stored as integer
//! hundredths. All comparisons (crash threshold, snap tolerance) happen on
//! the integer form, so two independent observers that round the same
//! candidate agree exactly - no float equality anywhere in the domain logic.
//!
//! The flight curve itself lives here too: server `tick()` and the client
//! sync adapter both call [`multiplier_at`], which is what keeps any number
//! of observers converging on the same value without per-tick traffic.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Compounding growth rate of the flight curve: ~6% per second.
pub const GROWTH_RATE: f64 = 1.06;

/// A multiplier value stored as integer hundredths (2.54x == 254).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u32);

impl Multiplier {
    /// 1.00x, the floor of every round.
    pub const ONE: Multiplier = Multiplier(100);

    /// 1000.00x, the cap applied to every crash point.
    pub const MAX: Multiplier = Multiplier(100_000);

    /// Build from raw hundredths.
    #[inline]
    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    /// Raw hundredths value.
    #[inline]
    pub const fn hundredths(self) -> u32 {
        self.0
    }

    /// Build from a float, rounding to two decimals.
    ///
    /// Negative or non-finite inputs collapse to zero hundredths; domain
    /// code never produces them, but wire input can.
    #[inline]
    pub fn from_f64(value: f64) -> Self {
        let scaled = (value * 100.0).round();
        if scaled.is_finite() && scaled > 0.0 {
            Self(scaled.min(u32::MAX as f64) as u32)
        } else {
            Self(0)
        }
    }

    /// Convert to a float for display or wire encoding.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Absolute difference in hundredths.
    #[inline]
    pub fn abs_diff(self, other: Multiplier) -> u32 {
        self.0.abs_diff(other.0)
    }

    /// Clamp into the valid crash-point range [1.00, 1000.00].
    #[inline]
    pub fn clamp_to_range(self) -> Self {
        Self(self.0.clamp(Self::ONE.0, Self::MAX.0))
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / 100, self.0 % 100)
    }
}

// Wire form is the decimal value, not the hundredths encoding.
impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Multiplier::from_f64(value))
    }
}

/// The flight curve: multiplier after `elapsed` time of flight.
///
/// `GROWTH_RATE ^ seconds`, rounded to two decimals. This is the single
/// formula shared by the scheduler's `tick()` and the client sync adapter.
#[inline]
pub fn multiplier_at(elapsed: Duration) -> Multiplier {
    Multiplier::from_f64(GROWTH_RATE.powf(elapsed.as_secs_f64()))
}
