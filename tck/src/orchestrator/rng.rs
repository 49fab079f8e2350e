// Seeded RNG for tests that pick random depositors and amounts outside
// proptest. The seed is logged so a failing run can be replayed.

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Environment variable holding a replay seed (hex, `0x` prefix optional)
pub const SEED_ENV_VAR: &str = "SAVINGS_TEST_SEED";

/// Test RNG with seed for reproducibility
///
/// ```text
/// TestRng seed 0xa3f5c8e1b2d94706, replay with SAVINGS_TEST_SEED=0xa3f5c8e1b2d94706
/// ```
pub struct TestRng {
    inner: Mutex<StdRng>,
    seed: u64,
}

impl TestRng {
    /// Create a TestRng with an explicit seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
            seed,
        }
    }

    /// Seed from `SAVINGS_TEST_SEED` when set, otherwise pick a random seed.
    /// The seed is logged at info level either way.
    pub fn new_from_env_or_random() -> Self {
        let seed = std::env::var(SEED_ENV_VAR)
            .ok()
            .and_then(|s| parse_seed(&s))
            .unwrap_or_else(|| rand::thread_rng().gen());

        if log::log_enabled!(log::Level::Info) {
            log::info!(
                "TestRng seed 0x{:016x}, replay with {}=0x{:016x}",
                seed,
                SEED_ENV_VAR,
                seed
            );
        }

        Self::with_seed(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn gen<T>(&self) -> T
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        self.inner.lock().gen()
    }

    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.inner.lock().gen_range(range)
    }

    pub fn choose<'a, T>(&self, slice: &'a [T]) -> Option<&'a T> {
        use rand::seq::SliceRandom;
        slice.choose(&mut *self.inner.lock())
    }
}

fn parse_seed(raw: &str) -> Option<u64> {
    let trimmed = raw.trim().trim_start_matches("0x");
    u64::from_str_radix(trimmed, 16).ok()
}
