//! Crash-Point Generation
//!
//! Pure functions producing a round's terminal multiplier from uniform
//! draws. Two generators sit behind one `Mode` switch:
//!
//! - `Normal`: the heavy-tailed formula. A fixed 1-in-33 slice of the draw
//!   space crashes instantly at 1.00 (the house-edge floor), the rest
//!   follows `floor((100*E - h) / (E - h)) / 100` with `E = 2^32`, a
//!   Pareto-like curve favoring low multipliers.
//! - `Boosted`: explicit weighted bands giving operators coarse control
//!   over expected value for promo periods.
//!
//! Both are pure over an injected [`DrawSource`], so every output is
//! reproducible from the draws alone.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::multiplier::Multiplier;
use crate::core::rng::DrawSource;

/// Which generator produces the next round's crash point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Heavy-tailed formula generator.
    #[default]
    Normal,
    /// Weighted-band generator with boosted odds.
    Boosted,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Mode::Normal),
            "boosted" => Ok(Mode::Boosted),
            other => Err(format!("unknown mode '{other}' (expected normal|boosted)")),
        }
    }
}

/// Size of the draw space: draws are uniform in `[0, E)`.
const E: u64 = 1 << 32;

/// Weighted bands for boosted mode: (weight %, lo hundredths, hi hundredths).
///
/// Bands are half-open `[lo, hi)` except the instant-crash band where
/// lo == hi. Weights sum to exactly 100.
const BOOST_BANDS: &[(u32, u32, u32)] = &[
    (1, 100, 100),       // instant crash at 1.00
    (4, 101, 150),       // [1.01, 1.50)
    (10, 150, 200),      // [1.50, 2.00)
    (20, 200, 300),      // [2.00, 3.00)
    (20, 300, 500),      // [3.00, 5.00)
    (15, 500, 1_000),    // [5.00, 10.00)
    (10, 1_000, 2_000),  // [10.00, 20.00)
    (10, 2_000, 5_000),  // [20.00, 50.00)
    (10, 5_000, 10_000), // [50.00, 100.00)
];

/// Generate a crash point with the generator selected by `mode`.
///
/// Always returns a value in `[1.00, 1000.00]`.
pub fn generate(mode: Mode, draws: &mut impl DrawSource) -> Multiplier {
    match mode {
        Mode::Normal => generate_formula(draws),
        Mode::Boosted => generate_banded(draws),
    }
}

/// The heavy-tailed formula generator.
fn generate_formula(draws: &mut impl DrawSource) -> Multiplier {
    let h = draws.next_draw() as u64;

    // House-edge floor: ~3% of the draw space crashes instantly.
    if h % 33 == 0 {
        return Multiplier::ONE;
    }

    // hundredths = floor((100*E - h) / (E - h)); h < E so the divisor is
    // never zero and 100*E fits comfortably in u64.
    let hundredths = (100 * E - h) / (E - h);

    Multiplier::from_hundredths(hundredths.min(u32::MAX as u64) as u32).clamp_to_range()
}

/// The weighted-band generator for boosted odds.
fn generate_banded(draws: &mut impl DrawSource) -> Multiplier {
    let roll = draws.next_draw() % 100;

    let mut cumulative = 0;
    for &(weight, lo, hi) in BOOST_BANDS {
        cumulative += weight;
        if roll < cumulative {
            let span = hi - lo;
            let hundredths = if span == 0 {
                lo
            } else {
                lo + draws.next_draw() % span
            };
            return Multiplier::from_hundredths(hundredths).clamp_to_range();
        }
    }

    // Weights sum to 100 so the loop always returns; keep the fallback
    // on the safe side of the house edge anyway.
    Multiplier::ONE
}

// =============================================================================
// TESTS
// =============================================================================
