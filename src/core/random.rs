use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Builds the RNG for one task.
///
/// With a seed, every `stream` gets its own reproducible sequence; without
/// one the generator is seeded from entropy.
pub fn rng_for(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => StdRng::from_entropy(),
    }
}

/// Random string of ASCII digits.
pub fn random_digits(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
