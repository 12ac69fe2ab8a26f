//! Per-feature relevance and information-theoretic scores.
//!
//! These rank single columns against the class labels and are shared with the
//! eager hierarchical selectors.

use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::dataset::{check_labeled, class_counts, class_value_counts};
use crate::errors::{HfsError, Result};

/// `sum over c of (P(c | x = 1) - P(c | x = 0))^2`.
///
/// A conditional is taken as 0 when its conditioning value never occurs.
/// For two classes the result lies in [0, 2].
///
/// # Errors
/// - `FeatureOutOfBounds` if `column >= x.ncols()`
/// - anything [`check_labeled`] rejects
pub fn relevance(x: ArrayView2<'_, u8>, y: &[usize], column: usize) -> Result<f64> {
    let n_classes = check_labeled(x, y)?;
    if column >= x.ncols() {
        return Err(HfsError::FeatureOutOfBounds(column, x.ncols()));
    }
    Ok(relevance_of(&class_value_counts(x, y, n_classes, column)))
}

/// [`relevance`] for every column.
pub fn relevance_scores(x: ArrayView2<'_, u8>, y: &[usize]) -> Result<Vec<f64>> {
    let n_classes = check_labeled(x, y)?;
    Ok((0..x.ncols())
        .into_par_iter()
        .map(|col| relevance_of(&class_value_counts(x, y, n_classes, col)))
        .collect())
}

fn relevance_of(counts: &[[usize; 2]]) -> f64 {
    let with_value = |v: usize| counts.iter().map(|c| c[v]).sum::<usize>();
    let (zeros, ones) = (with_value(0), with_value(1));
    let conditional = |hits: usize, total: usize| if total == 0 { 0.0 } else { hits as f64 / total as f64 };

    counts
        .iter()
        .map(|c| {
            let diff = conditional(c[1], ones) - conditional(c[0], zeros);
            diff * diff
        })
        .sum()
}

/// Base-2 entropy of a count distribution.
fn entropy(counts: impl IntoIterator<Item = usize>) -> f64 {
    let counts: Vec<usize> = counts.into_iter().collect();
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

/// Information gain `H(Y) - H(Y | X_j)` and split information `H(X_j)`.
fn gain_and_split(counts: &[[usize; 2]], class_entropy: f64, n: f64) -> (f64, f64) {
    let mut conditional = 0.0;
    let mut split = [0usize; 2];
    for v in 0..2 {
        let with_value: usize = counts.iter().map(|c| c[v]).sum();
        split[v] = with_value;
        if with_value > 0 {
            conditional += (with_value as f64 / n) * entropy(counts.iter().map(|c| c[v]));
        }
    }
    // Clamp float noise on identical distributions
    ((class_entropy - conditional).max(0.0), entropy(split))
}

/// Information gain of every column with respect to `y`.
pub fn information_gain(x: ArrayView2<'_, u8>, y: &[usize]) -> Result<Vec<f64>> {
    let n_classes = check_labeled(x, y)?;
    let class_entropy = entropy(class_counts(y, n_classes));
    let n = y.len() as f64;
    Ok((0..x.ncols())
        .into_par_iter()
        .map(|col| gain_and_split(&class_value_counts(x, y, n_classes, col), class_entropy, n).0)
        .collect())
}

/// Gain ratio (information gain over split information); 0 for constant columns.
pub fn gain_ratio(x: ArrayView2<'_, u8>, y: &[usize]) -> Result<Vec<f64>> {
    let n_classes = check_labeled(x, y)?;
    let class_entropy = entropy(class_counts(y, n_classes));
    let n = y.len() as f64;
    Ok((0..x.ncols())
        .into_par_iter()
        .map(|col| {
            let (gain, split) = gain_and_split(&class_value_counts(x, y, n_classes, col), class_entropy, n);
            if split > 0.0 {
                gain / split
            } else {
                0.0
            }
        })
        .collect())
}
