use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Randomness behind the presentation-only "feel" metrics.
///
/// Injected so tests can pin the output; never consulted for physical state.
pub trait JitterSource: Send {
    /// Uniform offset in `[-amplitude, amplitude]`.
    fn offset(&mut self, amplitude: f32) -> f32;
}

/// ChaCha8-backed jitter, reproducible for a given seed.
pub struct SeededJitter {
    rng: ChaCha8Rng,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_clock() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed);
        Self::new(seed)
    }
}

impl JitterSource for SeededJitter {
    fn offset(&mut self, amplitude: f32) -> f32 {
        if !amplitude.is_finite() || amplitude <= 0.0 {
            return 0.0;
        }
        self.rng.random_range(-amplitude..=amplitude)
    }
}

/// Always zero; makes every derived metric deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroJitter;

impl JitterSource for ZeroJitter {
    fn offset(&mut self, _amplitude: f32) -> f32 {
        0.0
    }
}
