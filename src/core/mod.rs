//! Deterministic Core Primitives
//!
//! Everything in this module is pure and synchronous: integer multiplier
//! arithmetic, phase-duration clock math, and seeded randomness. Domain
//! logic builds on these; nothing here touches the store or the network.

pub mod clock;
pub mod multiplier;
pub mod rng;
