//! Descriptive and inferential statistics over the summary table.
//!
//! Everything here is a pure function over `f64` slices; the report binaries
//! pick the columns and render the results.
pub mod correlation;
pub mod describe;
pub mod logistic;
pub mod regression;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Quantile by linear interpolation between closest ranks.
///
/// `values` must be sorted ascending and non-empty, `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    assert!(!values.is_empty(), "quantile of an empty slice");
    assert!((0.0..=1.0).contains(&q), "quantile out of range");
    let pos = q * (values.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        values[lower]
    } else {
        let t = pos - lower as f64;
        values[lower] + t * (values[upper] - values[lower])
    }
}

/// Deterministic index split into (train, test).
///
/// The shuffle is seeded so a report renders the same figures on every run.
/// `test_fraction` rounds half-up to whole rows, but both sides keep at
/// least one row when `n >= 2`.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    assert!((0.0..1.0).contains(&test_fraction));
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let mut test_len = (n as f64 * test_fraction).round() as usize;
    if n >= 2 {
        test_len = test_len.clamp(1, n - 1);
    }
    let train = indices.split_off(test_len);
    (train, indices)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 1.0), 4.0);
        assert_eq!(quantile(&values, 0.5), 2.5);
        assert_eq!(quantile(&values, 0.25), 1.75);
    }

    #[test]
    fn split_is_deterministic_and_partitions() {
        let (train_a, test_a) = train_test_split(10, 0.2, 0);
        let (train_b, test_b) = train_test_split(10, 0.2, 0);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(train_a.len(), 8);
        assert_eq!(test_a.len(), 2);
        let mut all: Vec<usize> = train_a.iter().chain(test_a.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }
}
