//! Round Logic
//!
//! The domain layer: round entity, crash-point generation, the CAS-guarded
//! store boundary, the scheduler state machine, and the async driver loop
//! that feeds it. Everything except the driver is synchronous and
//! deterministic given the store contents and the draw source.

pub mod crash_point;
pub mod driver;
pub mod round;
pub mod scheduler;
pub mod store;
