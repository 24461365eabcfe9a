use rand::{rngs::StdRng, Rng, SeedableRng};

/// Random source for `rand`, `randint` and `choice`.
///
/// Generators built from the same seed draw the same sequence. Reseeding
/// only affects draws made afterwards.
#[derive(Debug, Clone)]
pub struct FormulaRng {
    rng: StdRng,
    seed: Option<u64>,
}

impl Default for FormulaRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl FormulaRng {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        tracing::debug!(seed, "reseeding formula generator");
        *self = Self::with_seed(seed);
    }

    /// Seed of the current sequence, `None` when seeded from entropy.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Uniform float in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform integer in `[low, high)`. Callers guarantee `low < high`.
    pub fn below(&mut self, low: i128, high: i128) -> i128 {
        self.rng.gen_range(low..high)
    }

    /// Uniform position in `[0, len)`. Callers guarantee `len > 0`.
    pub fn position(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}
