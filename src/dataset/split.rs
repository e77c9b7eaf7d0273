//! Random train/validation/test partitioning.
//!
//! Rows are assigned by shuffling their indices (Fisher-Yates via
//! `rand::seq::SliceRandom`); each side keeps the input's relative order so a
//! seeded split feeds the trainer the same sequence on every run.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Split settings read from the `[split]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Share of rows held out for evaluation, in (0, 1).
    pub test_fraction: f64,
    /// Share of rows held out for validation during training, in [0, 1).
    pub validation_fraction: f64,
    /// Fixed seed for reproducible partitions; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            validation_fraction: 0.0,
            seed: Some(42),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("test fraction must lie in (0, 1), got {0}")]
    TestFraction(f64),
    #[error("validation fraction must lie in [0, 1), got {0}")]
    ValidationFraction(f64),
    #[error("test and validation fractions sum to {0}, leaving no training share")]
    NoTrainingShare(f64),
}

/// Disjoint partitions of one input table.
#[derive(Debug, Clone, PartialEq)]
pub struct Split<T> {
    pub train: Vec<T>,
    pub validation: Vec<T>,
    pub test: Vec<T>,
}

/// Partition `rows` into train and test; `|test| = ceil(f * n)`.
pub fn split<T>(rows: Vec<T>, test_fraction: f64, seed: Option<u64>) -> Result<Split<T>, SplitError> {
    split_with_validation(rows, test_fraction, 0.0, seed)
}

/// Partition `rows` into train, validation and test.
///
/// The test side takes `ceil(test_fraction * n)` rows, the validation side
/// `ceil(validation_fraction * n)` of what remains, and train keeps the rest.
pub fn split_with_validation<T>(
    rows: Vec<T>,
    test_fraction: f64,
    validation_fraction: f64,
    seed: Option<u64>,
) -> Result<Split<T>, SplitError> {
    validate_fractions(test_fraction, validation_fraction)?;
    let total = rows.len();
    let test_n = share_of(total, test_fraction);
    let val_n = share_of(total, validation_fraction).min(total - test_n);

    let mut order: Vec<usize> = (0..total).collect();
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    order.shuffle(&mut rng);

    let mut side = vec![Side::Train; total];
    for &idx in &order[..test_n] {
        side[idx] = Side::Test;
    }
    for &idx in &order[test_n..test_n + val_n] {
        side[idx] = Side::Validation;
    }

    let mut out = Split {
        train: Vec::with_capacity(total - test_n - val_n),
        validation: Vec::with_capacity(val_n),
        test: Vec::with_capacity(test_n),
    };
    for (row, side) in rows.into_iter().zip(side) {
        match side {
            Side::Train => out.train.push(row),
            Side::Validation => out.validation.push(row),
            Side::Test => out.test.push(row),
        }
    }

    tracing::debug!(
        "Dataset split: {} train, {} validation, {} test",
        out.train.len(),
        out.validation.len(),
        out.test.len()
    );
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Train,
    Validation,
    Test,
}

fn validate_fractions(test_fraction: f64, validation_fraction: f64) -> Result<(), SplitError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(SplitError::TestFraction(test_fraction));
    }
    if !(0.0..1.0).contains(&validation_fraction) {
        return Err(SplitError::ValidationFraction(validation_fraction));
    }
    let sum = test_fraction + validation_fraction;
    if sum >= 1.0 {
        return Err(SplitError::NoTrainingShare(sum));
    }
    Ok(())
}

/// `ceil(fraction * total)`, tolerant of products like `0.3 * 10 = 3.0000000000000004`.
fn share_of(total: usize, fraction: f64) -> usize {
    if fraction <= 0.0 {
        return 0;
    }
    let raw = (total as f64) * fraction;
    let rounded = raw.round();
    let n = if (raw - rounded).abs() < 1e-9 {
        rounded
    } else {
        raw.ceil()
    };
    (n as usize).min(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn sizes_follow_ceiling_rule() {
        for (n, f, expected_test) in [(10, 0.3, 3), (10, 0.25, 3), (7, 0.5, 4), (1, 0.2, 1), (100, 0.2, 20)] {
            let rows: Vec<usize> = (0..n).collect();
            let split = split(rows, f, Some(7)).unwrap();
            assert_eq!(split.test.len(), expected_test, "n={n} f={f}");
            assert_eq!(split.train.len(), n - expected_test, "n={n} f={f}");
            assert!(split.validation.is_empty());
        }
    }

    #[test]
    fn partitions_are_disjoint_and_complete() {
        let rows: Vec<usize> = (0..53).collect();
        let split = split_with_validation(rows, 0.2, 0.1, Some(1)).unwrap();
        let mut seen = BTreeSet::new();
        for row in split.train.iter().chain(&split.validation).chain(&split.test) {
            assert!(seen.insert(*row), "row {row} duplicated");
        }
        assert_eq!(seen.len(), 53);
        assert_eq!(split.test.len(), 11);
        assert_eq!(split.validation.len(), 6);
    }

    #[test]
    fn fixed_seed_is_reproducible_and_order_preserving() {
        let a = split((0..200).collect::<Vec<_>>(), 0.3, Some(99)).unwrap();
        let b = split((0..200).collect::<Vec<_>>(), 0.3, Some(99)).unwrap();
        assert_eq!(a, b);
        assert!(a.train.windows(2).all(|w| w[0] < w[1]));
        assert!(a.test.windows(2).all(|w| w[0] < w[1]));

        let c = split((0..200).collect::<Vec<_>>(), 0.3, Some(100)).unwrap();
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn unseeded_split_still_partitions() {
        let split = split((0..40).collect::<Vec<_>>(), 0.5, None).unwrap();
        assert_eq!(split.train.len() + split.test.len(), 40);
    }

    #[test]
    fn empty_input_yields_empty_sides() {
        let split = split(Vec::<u8>::new(), 0.2, Some(3)).unwrap();
        assert!(split.train.is_empty() && split.test.is_empty());
    }

    #[test]
    fn rejects_out_of_range_fractions() {
        assert_eq!(
            split(vec![1, 2], 0.0, None).unwrap_err(),
            SplitError::TestFraction(0.0)
        );
        assert_eq!(
            split(vec![1, 2], 1.0, None).unwrap_err(),
            SplitError::TestFraction(1.0)
        );
        assert!(matches!(
            split_with_validation(vec![1, 2], 0.6, 0.4, None),
            Err(SplitError::NoTrainingShare(_))
        ));
    }
}
