//! Cryptographically-secure random helpers.
//!
//! Used for retry jitter and the load balancer's random policy. Everything
//! draws from the OS entropy source; no seedable generators in non-test
//! code.

use rand::rngs::OsRng;
use rand::Rng;

/// A uniform integer in `[0, upper)`. Returns 0 when `upper` is 0.
pub fn secure_index(upper: usize) -> usize {
    if upper == 0 {
        return 0;
    }
    OsRng.gen_range(0..upper)
}

/// A uniform float in `[0.0, 1.0)`.
pub fn secure_unit() -> f64 {
    OsRng.gen_range(0.0..1.0)
}

/// Apply ±`fraction` multiplicative jitter to `value`.
///
/// With `fraction = 0.2` the result lies in `[0.8 × value, 1.2 × value]`.
pub fn jitter(value: f64, fraction: f64) -> f64 {
    let spread = 2.0 * fraction * secure_unit() - fraction;
    value * (1.0 + spread)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_index_stays_in_range() {
        for _ in 0..1000 {
            let v = secure_index(7);
            assert!(v < 7);
        }
    }

    #[test]
    fn secure_index_zero_upper() {
        assert_eq!(secure_index(0), 0);
    }

    #[test]
    fn secure_unit_stays_in_range() {
        for _ in 0..1000 {
            let v = secure_unit();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn jitter_bounds() {
        for _ in 0..1000 {
            let v = jitter(100.0, 0.2);
            assert!((80.0..=120.0).contains(&v), "jittered value {v} out of bounds");
        }
    }
}
