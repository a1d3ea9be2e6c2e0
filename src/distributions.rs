use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Poisson};
use xxhash_rust::xxh3::xxh3_64;

use crate::types::Bounds;

/// Above this rate Knuth's product method needs hundreds of uniforms per
/// draw and `exp(-λ)` approaches underflow; hand over to `rand_distr`.
pub const KNUTH_MAX_LAMBDA: f64 = 500.0;

/// From this rate on the count is the rate itself, rounded and saturated to
/// `u64::MAX`. `rand_distr` rejects rates near 1.8e19, and the relative
/// spread of a Poisson count here is below 1e-9.
pub const SATURATING_LAMBDA: f64 = 1.0e19;

/// Triangular distribution over validated bounds.
///
/// Always consumes exactly one uniform, including for the degenerate
/// `max == min` case, so the number of draws taken from a stream depends
/// only on which factors are sampled and never on their values.
#[derive(Debug, Clone, Copy)]
pub struct Triangular(pub Bounds);

impl Distribution<f64> for Triangular {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let Bounds { min, mode, max } = self.0;
        let u: f64 = rng.random();
        let range = max - min;
        if range <= 0.0 {
            return min;
        }
        let fc = (mode - min) / range;
        let x = if u < fc {
            min + (u * range * (mode - min)).sqrt()
        } else {
            max - ((1.0 - u) * range * (max - mode)).sqrt()
        };
        // Rounding can push the inverse CDF an ulp past either end.
        x.clamp(min, max)
    }
}

pub fn triangular(bounds: Bounds, rng: &mut impl Rng) -> f64 {
    Triangular(bounds).sample(rng)
}

/// Event counts for one simulated year.
///
/// Knuth's product method: multiply uniforms until the running product
/// drops to `exp(-λ)`; the count is the number of multiplications minus one.
/// `λ <= 0` (or NaN) returns 0 without touching the stream, and so does
/// the saturating branch above [`SATURATING_LAMBDA`].
#[derive(Debug, Clone, Copy)]
pub struct EventCount {
    pub lambda: f64,
}

impl Distribution<u64> for EventCount {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let lambda = self.lambda;
        if !(lambda > 0.0) {
            return 0;
        }
        if lambda >= SATURATING_LAMBDA {
            return lambda.round() as u64;
        }
        if lambda > KNUTH_MAX_LAMBDA {
            return match Poisson::new(lambda) {
                Ok(dist) => {
                    let n: f64 = dist.sample(rng);
                    n as u64
                }
                Err(_) => lambda.round() as u64,
            };
        }
        let threshold = (-lambda).exp();
        let mut product = 1.0;
        let mut multiplications = 0u64;
        loop {
            product *= rng.random::<f64>();
            multiplications += 1;
            if product <= threshold {
                return multiplications - 1;
            }
        }
    }
}

pub fn poisson(lambda: f64, rng: &mut impl Rng) -> u64 {
    EventCount { lambda }.sample(rng)
}

/// Clamp to the unit interval. NaN maps to 0.
pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

/// Deterministic generator for a seed.
pub fn seeded(seed: u64) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(seed)
}

/// Per-draw random streams derived from one run seed.
///
/// Draw `i` reads its scenario factors and event count from ChaCha stream
/// `2i` and its control effectiveness samples from stream `2i + 1`. Two runs
/// sharing a seed therefore see the same scenario uniforms for every draw no
/// matter how many controls either run samples, and a draw's output does not
/// depend on chunking or on which thread evaluates it.
///
/// Within the control stream each control reads from its own block (see
/// [`ControlStreams`]), so a control's samples do not move when others are
/// added or removed.
#[derive(Debug, Clone)]
pub struct DrawStreams {
    key: [u8; 32],
}

impl DrawStreams {
    pub fn new(seed: u64) -> Self {
        DrawStreams { key: seeded(seed).get_seed() }
    }

    pub fn scenario(&self, draw: u64) -> ChaCha20Rng {
        self.stream(draw.wrapping_mul(2))
    }

    pub fn controls(&self, draw: u64) -> ControlStreams {
        ControlStreams { base: self.stream(draw.wrapping_mul(2).wrapping_add(1)) }
    }

    fn stream(&self, id: u64) -> ChaCha20Rng {
        let mut rng = ChaCha20Rng::from_seed(self.key);
        rng.set_stream(id);
        rng
    }
}

/// One draw's control stream, split into per-control blocks.
///
/// A control keyed `k` starts reading at block `k` of the stream. A block is
/// 16 words, enough for the three effectiveness samples a control takes.
#[derive(Debug, Clone)]
pub struct ControlStreams {
    base: ChaCha20Rng,
}

impl ControlStreams {
    /// Control samples for a test or bench that has no [`DrawStreams`].
    pub fn from_seed(seed: u64) -> Self {
        ControlStreams { base: seeded(seed) }
    }

    pub fn for_key(&self, key: u64) -> ChaCha20Rng {
        let mut rng = self.base.clone();
        rng.set_word_pos(u128::from(key) << 4);
        rng
    }
}

/// Stable key for a control id. Same id, same block, on every platform.
pub fn stream_key(id: &str) -> u64 {
    xxh3_64(id.as_bytes())
}

/// A fresh, non-reproducible seed for runs that were not given one.
pub fn entropy_seed() -> u64 {
    rand::rng().random()
}
