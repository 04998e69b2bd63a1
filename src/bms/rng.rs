//! Random number generation for `#RANDOM` blocks.
//!
//! [`RngMock`] returns predefined values in rotation and is what tests use. [`RandRng`] draws from any generator of
//! the [`rand`] crate.
//!
//! [`rand`]: https://crates.io/crates/rand

use core::ops::RangeInclusive;

/// A random number generator for `#RANDOM` blocks.
///
/// The generated number must be within `range`. The evaluator clamps values outside of it.
pub trait Rng {
    /// Generates an integer within `range`.
    ///
    /// ```
    /// use bms_timeline::bms::rng::{Rng, RngMock};
    ///
    /// let mut rng = RngMock([5]);
    /// assert_eq!(rng.generate(1..=10), 5);
    /// ```
    fn generate(&mut self, range: RangeInclusive<u64>) -> u64;
}

impl<T: Rng + ?Sized> Rng for Box<T> {
    fn generate(&mut self, range: RangeInclusive<u64>) -> u64 {
        T::generate(self, range)
    }
}

impl<T: Rng + ?Sized> Rng for &mut T {
    fn generate(&mut self, range: RangeInclusive<u64>) -> u64 {
        T::generate(self, range)
    }
}

/// A deterministic generator returning the values of the array in rotation.
///
/// ```
/// use bms_timeline::bms::rng::{Rng, RngMock};
///
/// let mut rng = RngMock([1, 2]);
/// assert_eq!(rng.generate(1..=10), 1);
/// assert_eq!(rng.generate(1..=10), 2);
/// assert_eq!(rng.generate(1..=10), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RngMock<const N: usize>(pub [u64; N]);

impl<const N: usize> Rng for RngMock<N> {
    fn generate(&mut self, _range: RangeInclusive<u64>) -> u64 {
        let Some(first) = self.0.first().copied() else {
            return 0;
        };
        self.0.rotate_left(1);
        first
    }
}

/// A generator backed by the [`rand`] crate.
///
/// ```
/// use bms_timeline::bms::rng::{Rng, RandRng};
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let mut rng = RandRng(StdRng::seed_from_u64(42));
/// let n = rng.generate(1..=10);
/// assert!((1..=10).contains(&n));
/// ```
///
/// [`rand`]: https://crates.io/crates/rand
#[cfg(feature = "rand")]
#[derive(Debug, Clone)]
pub struct RandRng<R>(pub R);

#[cfg(feature = "rand")]
impl<R: rand::Rng> Rng for RandRng<R> {
    fn generate(&mut self, range: RangeInclusive<u64>) -> u64 {
        let (start, end) = (*range.start(), *range.end());
        if end < start {
            return start;
        }
        match (end - start).checked_add(1) {
            Some(width) => self.0.next_u64() % width + start,
            None => self.0.next_u64(),
        }
    }
}

/// A tiny generator for builds without the `rand` feature: SplitMix64 over a fixed or caller-supplied seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SplitMix64(pub u64);

impl Rng for SplitMix64 {
    fn generate(&mut self, range: RangeInclusive<u64>) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        let (start, end) = (*range.start(), *range.end());
        if end < start {
            return start;
        }
        match (end - start).checked_add(1) {
            Some(width) => z % width + start,
            None => z,
        }
    }
}

/// Creates the generator used for one compilation: seeded when `seed` is given, otherwise fresh entropy.
#[must_use]
pub fn default_rng(seed: Option<u64>) -> Box<dyn Rng> {
    #[cfg(feature = "rand")]
    {
        use rand::{SeedableRng, rngs::StdRng};
        match seed {
            Some(seed) => Box::new(RandRng(StdRng::seed_from_u64(seed))),
            None => Box::new(RandRng(StdRng::from_rng(&mut rand::rng()))),
        }
    }
    #[cfg(not(feature = "rand"))]
    {
        Box::new(SplitMix64(seed.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_rotates() {
        let mut rng = RngMock([3, 1, 2]);
        let drawn: Vec<_> = (0..4).map(|_| rng.generate(1..=3)).collect();
        assert_eq!(drawn, vec![3, 1, 2, 3]);
    }

    #[test]
    fn empty_mock_yields_zero() {
        let mut rng = RngMock::<0>([]);
        assert_eq!(rng.generate(1..=3), 0);
    }

    #[cfg(feature = "rand")]
    #[test]
    fn seeded_rand_is_in_range_and_repeatable() {
        use rand::{SeedableRng, rngs::StdRng};

        let mut a = RandRng(StdRng::seed_from_u64(7));
        let mut b = RandRng(StdRng::seed_from_u64(7));
        for _ in 0..100 {
            let n = a.generate(1..=6);
            assert!((1..=6).contains(&n));
            assert_eq!(n, b.generate(1..=6));
        }
    }

    #[test]
    fn split_mix_stays_in_range() {
        let mut rng = SplitMix64(1);
        for _ in 0..100 {
            assert!((2..=5).contains(&rng.generate(2..=5)));
        }
    }
}
