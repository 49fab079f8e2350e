//! Deterministic test infrastructure: clock control and seeded randomness.

/// Clock abstractions for deterministic time control in tests
pub mod clock;
/// Seeded random number generation for reproducible tests
pub mod rng;

pub use clock::{Clock, PausedClock, SystemClock};
pub use rng::{TestRng, SEED_ENV_VAR};
