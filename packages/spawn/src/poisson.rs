//! Poisson sampling for spawn counts.
//!
//! Small rates use Knuth's multiplication method directly. Larger rates are
//! split into chunks of at most [`KNUTH_CHUNK`] and the chunk draws are
//! summed, which is exact because a sum of independent Poisson variables is
//! itself Poisson. Past [`NORMAL_APPROX_THRESHOLD`] a normal approximation
//! keeps the draw bounded in time.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Largest rate handed to a single Knuth draw. `exp(-30)` is comfortably
/// representable, so the multiplication loop never underflows early.
const KNUTH_CHUNK: f64 = 30.0;

/// Rates above this use a normal approximation.
const NORMAL_APPROX_THRESHOLD: f64 = 10_000.0;

/// Draws one Poisson(`lambda`) sample.
///
/// `seed = Some(s)` seeds a fresh [`StdRng`], making the draw reproducible
/// for identical `(lambda, s)`. `None` draws from the thread-local RNG.
/// Non-positive or non-finite rates always yield `0`.
#[must_use]
pub fn sample_spawn_count(lambda: f64, seed: Option<u64>) -> u32 {
    match seed {
        Some(seed) => sample_poisson(&mut StdRng::seed_from_u64(seed), lambda),
        None => sample_poisson(&mut rand::thread_rng(), lambda),
    }
}

/// Draws one Poisson(`lambda`) sample from `rng`.
///
/// Non-positive or non-finite rates always yield `0`.
pub fn sample_poisson<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u32 {
    if !lambda.is_finite() || lambda <= 0.0 {
        return 0;
    }

    if lambda > NORMAL_APPROX_THRESHOLD {
        return sample_normal_approx(rng, lambda);
    }

    let mut remaining = lambda;
    let mut total: u32 = 0;
    while remaining > 0.0 {
        let chunk = remaining.min(KNUTH_CHUNK);
        total = total.saturating_add(sample_knuth(rng, chunk));
        remaining -= chunk;
    }
    total
}

fn sample_knuth<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u32 {
    let limit = (-lambda).exp();
    let mut k: u32 = 0;
    let mut p: f64 = 1.0;
    loop {
        p *= rng.r#gen::<f64>();
        if p <= limit {
            return k;
        }
        k += 1;
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sample_normal_approx<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u32 {
    let u1 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.r#gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    (lambda + lambda.sqrt() * z)
        .round()
        .clamp(0.0, f64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sample() {
        for seed in [0_u64, 1, 42, 9_999] {
            assert_eq!(
                sample_spawn_count(50.57, Some(seed)),
                sample_spawn_count(50.57, Some(seed))
            );
        }
    }

    #[test]
    fn non_positive_rate_is_zero_for_every_seed() {
        for seed in 0..50 {
            assert_eq!(sample_spawn_count(0.0, Some(seed)), 0);
            assert_eq!(sample_spawn_count(-3.5, Some(seed)), 0);
        }
        assert_eq!(sample_spawn_count(0.0, None), 0);
        assert_eq!(sample_spawn_count(f64::NAN, None), 0);
    }

    #[test]
    fn mean_and_range_are_sane_over_many_seeds() {
        let samples: Vec<u32> = (800..900)
            .map(|s| sample_spawn_count(50.57, Some(s)))
            .collect();
        let mean = f64::from(samples.iter().sum::<u32>()) / 100.0;
        assert!((45.0..=55.0).contains(&mean), "mean {mean} out of range");
        for sample in samples {
            assert!((30..=70).contains(&sample), "sample {sample} out of range");
        }
    }

    #[test]
    fn chunked_draws_track_large_rates() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 2_000;
        let sum: u64 = (0..n).map(|_| u64::from(sample_poisson(&mut rng, 250.0))).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = sum as f64 / f64::from(n);
        assert!((mean - 250.0).abs() < 3.0, "mean {mean} far from 250");
    }

    #[test]
    fn normal_approximation_stays_near_rate() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let sample = f64::from(sample_poisson(&mut rng, 50_000.0));
            assert!((sample - 50_000.0).abs() < 2_000.0);
        }
    }
}
