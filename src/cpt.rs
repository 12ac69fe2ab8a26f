//! Lazily populated conditional probability tables.
//!
//! Three tables back the HieAODE scores:
//!
//! - `prior`: P(class, feature = v), raw frequency
//! - `feature_given_class`: P(feature = v | class), smoothed
//! - `feature_given_class_and_parent`: P(feature = fv | class, parent = pv), smoothed
//!
//! Every cell is computed on first request and then frozen. Cells are
//! write-once (`OnceLock` for the per-feature tables, a per-shard entry lock
//! for the sparse pair table), so scoring rows from several threads never
//! stores two different values for the same key.

use dashmap::DashMap;
use rayon::prelude::*;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::dataset::TrainingSet;
use crate::errors::{HfsError, Result};

/// Pseudo-count added to every smoothed estimate.
pub const SMOOTHING_FACTOR: f64 = 1.0;
/// Value each smoothed binary estimate is pulled toward.
pub const PRIOR_PROBABILITY: f64 = 0.5;

/// Additive smoothing `(hits + alpha * prior) / (total + alpha)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Smoothing {
    pub alpha: f64,
    pub prior: f64,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self {
            alpha: SMOOTHING_FACTOR,
            prior: PRIOR_PROBABILITY,
        }
    }
}

impl Smoothing {
    /// # Errors
    /// - `InvalidParameter` unless `alpha > 0` and `0 < prior < 1`
    pub fn new(alpha: f64, prior: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha.is_finite()) {
            return Err(HfsError::InvalidParameter(format!(
                "smoothing factor must be positive, got {alpha}"
            )));
        }
        if !(prior > 0.0 && prior < 1.0) {
            return Err(HfsError::InvalidParameter(format!(
                "prior probability must be in (0, 1), got {prior}"
            )));
        }
        Ok(Self { alpha, prior })
    }

    #[inline]
    pub fn apply(&self, hits: usize, total: usize) -> f64 {
        (hits as f64 + self.alpha * self.prior) / (total as f64 + self.alpha)
    }
}

/// Probabilities indexed `[class][value]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassValueTable {
    cells: Vec<[f64; 2]>,
}

impl ClassValueTable {
    #[inline]
    pub fn get(&self, class: usize, value: u8) -> f64 {
        self.cells[class][value as usize]
    }

    pub fn n_classes(&self) -> usize {
        self.cells.len()
    }
}

/// Probabilities indexed `[class][feature_value][parent_value]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PairTable {
    cells: Vec<[[f64; 2]; 2]>,
}

impl PairTable {
    #[inline]
    pub fn get(&self, class: usize, feature_value: u8, parent_value: u8) -> f64 {
        self.cells[class][feature_value as usize][parent_value as usize]
    }

    pub fn n_classes(&self) -> usize {
        self.cells.len()
    }
}

/// Populated cell counts, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CptStats {
    pub prior: usize,
    pub feature_given_class: usize,
    pub feature_given_class_and_parent: usize,
}

/// The three lazily filled tables for one training set.
///
/// The cache does not own the training data; callers pass it on every lookup
/// and must keep passing the same set. Once a cell is filled, later lookups
/// return it unchanged whatever data they pass.
#[derive(Debug)]
pub struct CptCache {
    n_features: usize,
    smoothing: Smoothing,
    prior: Vec<OnceLock<ClassValueTable>>,
    feature_given_class: Vec<OnceLock<ClassValueTable>>,
    feature_given_class_and_parent: DashMap<(usize, usize), Arc<PairTable>, FxBuildHasher>,
}

impl CptCache {
    pub fn new(n_features: usize, smoothing: Smoothing) -> Self {
        Self {
            n_features,
            smoothing,
            prior: (0..n_features).map(|_| OnceLock::new()).collect(),
            feature_given_class: (0..n_features).map(|_| OnceLock::new()).collect(),
            feature_given_class_and_parent: DashMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }

    fn check_feature(&self, data: &TrainingSet, feature: usize) -> Result<()> {
        if data.n_features() != self.n_features {
            return Err(HfsError::ShapeMismatch {
                what: "training features vs cache features",
                expected: self.n_features,
                actual: data.n_features(),
            });
        }
        if feature >= self.n_features {
            return Err(HfsError::FeatureOutOfBounds(feature, self.n_features));
        }
        Ok(())
    }

    /// P(class, feature = v) as a plain frequency; may be 0.
    pub fn class_prior(&self, data: &TrainingSet, feature: usize) -> Result<&ClassValueTable> {
        self.check_feature(data, feature)?;
        Ok(self.prior[feature].get_or_init(|| {
            let n = data.n_samples() as f64;
            let cells = data
                .class_value_counts(feature)
                .into_iter()
                .map(|[zero, one]| [zero as f64 / n, one as f64 / n])
                .collect();
            ClassValueTable { cells }
        }))
    }

    /// Smoothed P(feature = v | class), strictly inside (0, 1).
    pub fn feature_given_class(&self, data: &TrainingSet, feature: usize) -> Result<&ClassValueTable> {
        self.check_feature(data, feature)?;
        Ok(self.feature_given_class[feature].get_or_init(|| {
            let smoothing = self.smoothing;
            let cells = data
                .class_value_counts(feature)
                .into_iter()
                .enumerate()
                .map(|(class, [zero, one])| {
                    let total = data.class_count(class);
                    [smoothing.apply(zero, total), smoothing.apply(one, total)]
                })
                .collect();
            ClassValueTable { cells }
        }))
    }

    /// Smoothed P(feature = fv | class, parent = pv), strictly inside (0, 1).
    ///
    /// # Errors
    /// - `SelfInteraction` if `feature == parent`
    pub fn feature_given_class_and_parent(&self, data: &TrainingSet, feature: usize, parent: usize) -> Result<Arc<PairTable>> {
        self.check_feature(data, feature)?;
        self.check_feature(data, parent)?;
        if feature == parent {
            return Err(HfsError::SelfInteraction(feature));
        }

        let key = (feature, parent);
        if let Some(table) = self.feature_given_class_and_parent.get(&key) {
            return Ok(Arc::clone(table.value()));
        }

        let smoothing = self.smoothing;
        let entry = self.feature_given_class_and_parent.entry(key).or_insert_with(|| {
            let cells = data
                .pair_counts(feature, parent)
                .into_iter()
                .map(|by_parent| {
                    let totals = [by_parent[0][0] + by_parent[0][1], by_parent[1][0] + by_parent[1][1]];
                    let mut cell = [[0.0; 2]; 2];
                    for fv in 0..2 {
                        for pv in 0..2 {
                            cell[fv][pv] = smoothing.apply(by_parent[pv][fv], totals[pv]);
                        }
                    }
                    cell
                })
                .collect();
            Arc::new(PairTable { cells })
        });
        Ok(Arc::clone(entry.value()))
    }

    /// Fill every cell inference can touch.
    ///
    /// `ancestors[i]` lists the ancestor columns of feature `i`; pairs are
    /// filled for every feature outside that set and other than `i`.
    pub fn warm(&self, data: &TrainingSet, ancestors: &[Vec<usize>]) -> Result<()> {
        if ancestors.len() != self.n_features {
            return Err(HfsError::ShapeMismatch {
                what: "ancestor lists vs cache features",
                expected: self.n_features,
                actual: ancestors.len(),
            });
        }

        (0..self.n_features).into_par_iter().try_for_each(|feature| {
            self.class_prior(data, feature)?;
            self.feature_given_class(data, feature)?;
            let excluded = &ancestors[feature];
            for other in 0..self.n_features {
                if other != feature && !excluded.contains(&other) {
                    self.feature_given_class_and_parent(data, other, feature)?;
                }
            }
            Ok::<(), HfsError>(())
        })?;

        let stats = self.stats();
        debug!(
            prior = stats.prior,
            feature_given_class = stats.feature_given_class,
            feature_given_class_and_parent = stats.feature_given_class_and_parent,
            "warmed CPT cache"
        );
        Ok(())
    }

    pub fn stats(&self) -> CptStats {
        CptStats {
            prior: self.prior.iter().filter(|c| c.get().is_some()).count(),
            feature_given_class: self.feature_given_class.iter().filter(|c| c.get().is_some()).count(),
            feature_given_class_and_parent: self.feature_given_class_and_parent.len(),
        }
    }
}
