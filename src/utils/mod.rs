pub mod log;
pub mod periodic;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Seeded generator when reproducibility is asked for, entropy otherwise.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
