//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ for fast, high-quality, deterministic randomness.
//! Given the same seed, produces an identical sequence on all platforms,
//! which is what makes crash-point generation reproducible in tests and
//! auditable after the fact.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Source of uniform random draws in `[0, 2^32)`.
///
/// The crash-point generators are pure functions over this trait, so tests
/// can feed fixed draws and assert exact outputs.
pub trait DrawSource {
    /// Next uniform draw in `[0, 2^32)`.
    fn next_draw(&mut self) -> u32;
}

/// Deterministic PRNG using the Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use crash_rocket::core::rng::XorshiftRng;
///
/// let mut rng = XorshiftRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct XorshiftRng {
    state: [u64; 2],
}

impl Default for XorshiftRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl XorshiftRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring good
    /// distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create RNG for a specific round from boot entropy.
    ///
    /// See [`derive_round_seed`] for what goes into the seed.
    pub fn for_round(boot_entropy: &[u8; 32], round_id: u64) -> Self {
        Self::new(derive_round_seed(boot_entropy, round_id))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random u32.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }
}

impl DrawSource for XorshiftRng {
    #[inline]
    fn next_draw(&mut self) -> u32 {
        self.next_u32()
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a per-round seed from boot entropy and the round id.
///
/// Boot entropy is sampled once at process start, so crash points are
/// unpredictable to observers, while a test that fixes the entropy gets a
/// fully reproducible sequence of rounds.
pub fn derive_round_seed(boot_entropy: &[u8; 32], round_id: u64) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"CRASH_ROCKET_SEED_V1");
    hasher.update(boot_entropy);
    hasher.update(round_id.to_le_bytes());

    let hash = hasher.finalize();

    // Take first 8 bytes as seed
    u64::from_le_bytes(hash[0..8].try_into().expect("hash is 32 bytes"))
}

// =============================================================================
// TESTS
// =============================================================================
