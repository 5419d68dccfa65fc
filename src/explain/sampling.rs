//! Seeded row sampling and column capping

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Stream used for the explained-row sample
pub const ROW_STREAM: u64 = 0;
/// Stream used for the background sample
pub const BACKGROUND_STREAM: u64 = 1;

/// Indices of `min(n, cap)` rows out of `n`, in ascending order.
///
/// Uniform without replacement and fully determined by `(seed, stream)`;
/// returns every row when `n <= cap`.
pub fn sample_rows(n: usize, cap: usize, seed: u64, stream: u64) -> Vec<usize> {
    if n <= cap {
        return (0..n).collect();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    let mut rows = rand::seq::index::sample(&mut rng, n, cap).into_vec();
    rows.sort_unstable();
    rows
}

/// Number of retained columns: the first `min(n_columns, cap)` by position
pub fn cap_features(n_columns: usize, cap: usize) -> usize {
    n_columns.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_input_keeps_all_rows() {
        assert_eq!(sample_rows(5, 10, 42, ROW_STREAM), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sample_is_deterministic_and_sorted() {
        let a = sample_rows(2000, 1000, 42, ROW_STREAM);
        let b = sample_rows(2000, 1000, 42, ROW_STREAM);
        assert_eq!(a.len(), 1000);
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert!(a.iter().all(|&i| i < 2000));
    }

    #[test]
    fn test_streams_differ() {
        let rows = sample_rows(500, 50, 7, ROW_STREAM);
        let background = sample_rows(500, 50, 7, BACKGROUND_STREAM);
        assert_ne!(rows, background);
    }

    #[test]
    fn test_cap_features() {
        assert_eq!(cap_features(80, 50), 50);
        assert_eq!(cap_features(3, 50), 3);
    }
}
