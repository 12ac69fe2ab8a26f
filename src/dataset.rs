//! Validated binary training data and the counting kernels built on it.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::errors::{HfsError, Result};

/// First cell outside {0, 1}, as (row, column, value).
pub(crate) fn first_non_binary(x: ArrayView2<'_, u8>) -> Option<(usize, usize, u8)> {
    x.indexed_iter()
        .find(|&(_, &v)| v > 1)
        .map(|((row, column), &value)| (row, column, value))
}

pub(crate) fn first_non_binary_in_row(row: ArrayView1<'_, u8>) -> Option<(usize, u8)> {
    row.iter().enumerate().find(|&(_, &v)| v > 1).map(|(column, &value)| (column, value))
}

/// Validate a matrix/label pair and return the class count (`max(label) + 1`).
///
/// # Errors
/// - `EmptyTrainingSet` if there are no rows
/// - `ShapeMismatch` if the label count differs from the row count
/// - `NonBinaryValue` for any value outside {0, 1}
pub(crate) fn check_labeled(x: ArrayView2<'_, u8>, y: &[usize]) -> Result<usize> {
    if x.nrows() == 0 || y.is_empty() {
        return Err(HfsError::EmptyTrainingSet);
    }
    if y.len() != x.nrows() {
        return Err(HfsError::ShapeMismatch {
            what: "labels vs training rows",
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    if let Some((row, column, value)) = first_non_binary(x) {
        return Err(HfsError::NonBinaryValue { row, column, value });
    }
    Ok(y.iter().copied().max().map_or(0, |m| m + 1))
}

/// Rows per class.
pub(crate) fn class_counts(y: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    counts
}

/// `[class][value]` row counts for one column.
pub(crate) fn class_value_counts(x: ArrayView2<'_, u8>, y: &[usize], n_classes: usize, column: usize) -> Vec<[usize; 2]> {
    let mut counts = vec![[0usize; 2]; n_classes];
    for (&value, &label) in x.column(column).iter().zip(y) {
        counts[label][value as usize] += 1;
    }
    counts
}

/// Owned, validated training data: a binary matrix plus class labels.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    x: Array2<u8>,
    y: Vec<usize>,
    n_classes: usize,
    class_counts: Vec<usize>,
}

impl TrainingSet {
    /// # Errors
    /// See [`check_labeled`]: empty data, label/row mismatch, non-binary values.
    pub fn new(x: Array2<u8>, y: Vec<usize>) -> Result<Self> {
        let n_classes = check_labeled(x.view(), &y)?;
        let class_counts = class_counts(&y, n_classes);
        Ok(Self {
            x,
            y,
            n_classes,
            class_counts,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn x(&self) -> ArrayView2<'_, u8> {
        self.x.view()
    }

    pub fn labels(&self) -> &[usize] {
        &self.y
    }

    pub fn class_count(&self, class: usize) -> usize {
        self.class_counts[class]
    }

    /// `[class][value]` counts for `feature`.
    pub fn class_value_counts(&self, feature: usize) -> Vec<[usize; 2]> {
        class_value_counts(self.x.view(), &self.y, self.n_classes, feature)
    }

    /// `[class][parent_value][feature_value]` counts for a feature/parent pair.
    pub fn pair_counts(&self, feature: usize, parent: usize) -> Vec<[[usize; 2]; 2]> {
        let mut counts = vec![[[0usize; 2]; 2]; self.n_classes];
        for (row, &label) in self.x.outer_iter().zip(&self.y) {
            counts[label][row[parent] as usize][row[feature] as usize] += 1;
        }
        counts
    }
}
