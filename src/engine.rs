//! Lazy hierarchy-aware Bayesian inference (the HieAODE family).
//!
//! For every test row, each feature `i` in turn acts as the conditioning
//! feature. Its contribution to class `c` is
//!
//! ```text
//! A[c] * D[c] * P(c, x_i = s_i)
//! A[c] = prod over ancestors a of i:             P(x_a = s_a | c)
//! D[c] = prod over j not in ancestors(i) + {i}:  T(j, i)[c][s_i][s_j]
//! ```
//!
//! `T(j, i)[c][fv][pv]` is P(x_j = fv | c, x_i = pv). The descendant lookup
//! reads it with the conditioning value first and the descendant value second.
//!
//! Contributions are summed over all features (averaged one-dependence
//! estimators) and the row is assigned the argmax class.
//!
//! "Descendants" here means every feature that is neither `i` nor one of its
//! ancestors, not only the nodes below `i` in the hierarchy.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::cpt::CptCache;
use crate::dataset::{first_non_binary_in_row, TrainingSet};
use crate::errors::{HfsError, InstanceError, Result};
use crate::hierarchy::{AncestorIndex, Hierarchy};
use crate::selector::{Estimator, LazySelector};

/// Evidence-combination policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Ancestor x descendant x prior.
    #[default]
    Full,
    /// Descendant x prior; ancestors ignored.
    Lite,
    /// Like `Full`, but ancestor and descendant products only use features
    /// observed as 1 (when at least one is).
    PlusPlus,
    /// Reserved; fails with `VariantNotImplemented`.
    Plus,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Full => "HieAODE",
            Variant::Lite => "HieAODELite",
            Variant::PlusPlus => "HieAODE++",
            Variant::Plus => "HieAODE+",
        }
    }

    fn uses_ancestors(&self) -> bool {
        !matches!(self, Variant::Lite)
    }

    fn positive_only(&self) -> bool {
        matches!(self, Variant::PlusPlus)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = HfsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "full" | "hieaode" => Ok(Variant::Full),
            "lite" | "hieaodelite" | "hieaode_lite" => Ok(Variant::Lite),
            "plus_plus" | "plusplus" | "hieaode++" | "hieaode_plus_plus" => Ok(Variant::PlusPlus),
            "plus" | "hieaode+" | "hieaode_plus" => Ok(Variant::Plus),
            other => Err(HfsError::InvalidParameter(format!("unknown variant: {other}"))),
        }
    }
}

/// What an empty ancestor or descendant set contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyEvidence {
    /// A zero vector: the feature adds nothing to any class.
    #[default]
    Zero,
    /// A ones vector: the empty product is neutral.
    Neutral,
}

impl EmptyEvidence {
    fn value(&self) -> f64 {
        match self {
            EmptyEvidence::Zero => 0.0,
            EmptyEvidence::Neutral => 1.0,
        }
    }
}

/// Per-row outcome of [`HieAode::select_and_predict`].
pub type InstanceResult = std::result::Result<usize, InstanceError>;
/// Per-row outcome of [`HieAode::scores`].
pub type InstanceScores = std::result::Result<Vec<f64>, InstanceError>;

/// State captured by `fit`.
#[derive(Debug)]
struct Fitted {
    train: TrainingSet,
    x_test: Array2<u8>,
    /// Ancestor columns of every column, sorted.
    ancestors: Vec<Vec<usize>>,
    cache: CptCache,
}

/// HieAODE lazy selector/classifier.
#[derive(Debug)]
pub struct HieAode {
    hierarchy: Hierarchy,
    config: EngineConfig,
    fitted: Option<Fitted>,
}

impl HieAode {
    pub fn new(hierarchy: Hierarchy, config: EngineConfig) -> Self {
        Self {
            hierarchy,
            config,
            fitted: None,
        }
    }

    pub fn with_variant(hierarchy: Hierarchy, variant: Variant) -> Self {
        Self::new(
            hierarchy,
            EngineConfig {
                variant,
                ..EngineConfig::default()
            },
        )
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn variant(&self) -> Variant {
        self.config.variant
    }

    /// The CPT cache of the last `fit`, if any.
    pub fn cache(&self) -> Option<&CptCache> {
        self.fitted.as_ref().map(|f| &f.cache)
    }

    /// Bind training and test data.
    ///
    /// `columns[k]` is the hierarchy node of column `k`; `None` means column
    /// `k` is node `k`. The CPT cache starts empty and fills during prediction.
    ///
    /// # Errors
    /// - `ShapeMismatch` for train/test column counts, label count, or a
    ///   column count different from the hierarchy size
    /// - `UnknownNode` / `DuplicateColumn` for a bad column mapping
    /// - `EmptyTrainingSet` / `NonBinaryValue` for bad training data
    /// - `InvalidParameter` for invalid smoothing settings
    pub fn fit(
        &mut self,
        x_train: ArrayView2<'_, u8>,
        y_train: &[usize],
        x_test: ArrayView2<'_, u8>,
        columns: Option<&[u32]>,
    ) -> Result<()> {
        let n_features = x_train.ncols();
        if x_test.ncols() != n_features {
            return Err(HfsError::ShapeMismatch {
                what: "test columns vs training columns",
                expected: n_features,
                actual: x_test.ncols(),
            });
        }
        if self.hierarchy.node_count() != n_features {
            return Err(HfsError::ShapeMismatch {
                what: "hierarchy nodes vs feature columns",
                expected: n_features,
                actual: self.hierarchy.node_count(),
            });
        }

        let columns: Vec<u32> = match columns {
            Some(columns) => columns.to_vec(),
            None => (0..n_features as u32).collect(),
        };
        if columns.len() != n_features {
            return Err(HfsError::ShapeMismatch {
                what: "column mapping length vs feature columns",
                expected: n_features,
                actual: columns.len(),
            });
        }

        let mut column_of: FxHashMap<u32, usize> = FxHashMap::default();
        for (col, &node) in columns.iter().enumerate() {
            if !self.hierarchy.contains(node) {
                return Err(HfsError::UnknownNode(node));
            }
            if column_of.insert(node, col).is_some() {
                return Err(HfsError::DuplicateColumn(node));
            }
        }

        let smoothing = self.config.smoothing()?;
        let train = TrainingSet::new(x_train.to_owned(), y_train.to_vec())?;

        let index = AncestorIndex::build(&self.hierarchy);
        let ancestors: Vec<Vec<usize>> = columns
            .iter()
            .map(|&node| {
                let mut cols: Vec<usize> = index
                    .ancestors(node)
                    .map(|set| set.iter().filter_map(|a| column_of.get(a).copied()).collect())
                    .unwrap_or_default();
                cols.sort_unstable();
                cols
            })
            .collect();

        info!(
            variant = %self.config.variant,
            samples = train.n_samples(),
            features = n_features,
            classes = train.n_classes(),
            test_rows = x_test.nrows(),
            "fitted lazy selector"
        );

        self.fitted = Some(Fitted {
            cache: CptCache::new(n_features, smoothing),
            train,
            x_test: x_test.to_owned(),
            ancestors,
        });
        Ok(())
    }

    fn ready(&self) -> Result<&Fitted> {
        if self.config.variant == Variant::Plus {
            return Err(HfsError::VariantNotImplemented(Variant::Plus.as_str()));
        }
        self.fitted.as_ref().ok_or(HfsError::NotFitted)
    }

    /// Summed per-class score of every test row.
    ///
    /// A row with a non-binary value yields an `Err` for that row only.
    pub fn scores(&self) -> Result<Vec<InstanceScores>> {
        let fitted = self.ready()?;
        if self.config.warm_cache {
            fitted.cache.warm(&fitted.train, &fitted.ancestors)?;
        }

        let n_rows = fitted.x_test.nrows();
        let score_row = |r: usize| -> Result<InstanceScores> {
            let row = fitted.x_test.row(r);
            if let Some((column, value)) = first_non_binary_in_row(row) {
                let err = InstanceError::NonBinaryValue { row: r, column, value };
                warn!("{}", err);
                return Ok(Err(err));
            }
            Ok(Ok(self.score_instance(fitted, row)?))
        };

        if self.config.parallel {
            (0..n_rows).into_par_iter().map(score_row).collect()
        } else {
            (0..n_rows).map(score_row).collect()
        }
    }

    /// Predict a class for every test row.
    ///
    /// Returns one entry per row when `predict` is set and an empty vector
    /// otherwise. `save_features` and `estimator` belong to eager selectors
    /// that hand a reduced matrix to a downstream classifier; HieAODE
    /// classifies by itself and ignores both.
    ///
    /// # Errors
    /// - `VariantNotImplemented` for [`Variant::Plus`]
    /// - `NotFitted` before `fit`
    pub fn select_and_predict(
        &self,
        predict: bool,
        save_features: bool,
        estimator: Option<&dyn Estimator>,
    ) -> Result<Vec<InstanceResult>> {
        self.ready()?;
        if save_features {
            debug!("save_features has no effect for {}", self.config.variant);
        }
        if let Some(estimator) = estimator {
            debug!("estimator {} unused by {}", estimator.name(), self.config.variant);
        }
        if !predict {
            return Ok(vec![]);
        }

        let predictions: Vec<InstanceResult> = self
            .scores()?
            .into_iter()
            .map(|scores| scores.map(|s| argmax(&s)))
            .collect();

        let failed = predictions.iter().filter(|p| p.is_err()).count();
        let stats = self.cache().map(|c| c.stats()).unwrap_or_default();
        info!(
            rows = predictions.len(),
            failed,
            cpt_pairs = stats.feature_given_class_and_parent,
            "predicted test rows"
        );
        Ok(predictions)
    }

    fn score_instance(&self, fitted: &Fitted, row: ArrayView1<'_, u8>) -> Result<Vec<f64>> {
        let variant = self.config.variant;
        let n_classes = fitted.train.n_classes();
        let n_features = fitted.train.n_features();
        let mut total = vec![0.0; n_classes];
        let mut excluded = vec![false; n_features];

        for feature in 0..n_features {
            let ancestors = &fitted.ancestors[feature];
            for &a in ancestors {
                excluded[a] = true;
            }
            excluded[feature] = true;
            let descendants: Vec<usize> = (0..n_features).filter(|&j| !excluded[j]).collect();
            for &a in ancestors {
                excluded[a] = false;
            }
            excluded[feature] = false;

            let mut term = self.descendant_term(fitted, row, feature, &descendants, variant.positive_only())?;
            if variant.uses_ancestors() {
                let ancestor = self.ancestor_term(fitted, row, ancestors, variant.positive_only())?;
                for (t, a) in term.iter_mut().zip(&ancestor) {
                    *t *= a;
                }
            }

            let prior = fitted.cache.class_prior(&fitted.train, feature)?;
            let value = row[feature];
            for (class, t) in term.iter().enumerate() {
                total[class] += t * prior.get(class, value);
            }
        }

        Ok(total)
    }

    fn ancestor_term(&self, fitted: &Fitted, row: ArrayView1<'_, u8>, ancestors: &[usize], positive_only: bool) -> Result<Vec<f64>> {
        let n_classes = fitted.train.n_classes();
        if ancestors.is_empty() {
            return Ok(vec![self.config.empty_evidence.value(); n_classes]);
        }

        let mut product = vec![1.0; n_classes];
        for a in evidence(ancestors, row, positive_only) {
            let table = fitted.cache.feature_given_class(&fitted.train, a)?;
            for (class, p) in product.iter_mut().enumerate() {
                *p *= table.get(class, row[a]);
            }
        }
        Ok(product)
    }

    fn descendant_term(
        &self,
        fitted: &Fitted,
        row: ArrayView1<'_, u8>,
        feature: usize,
        descendants: &[usize],
        positive_only: bool,
    ) -> Result<Vec<f64>> {
        let n_classes = fitted.train.n_classes();
        if descendants.is_empty() {
            return Ok(vec![self.config.empty_evidence.value(); n_classes]);
        }

        let mut product = vec![1.0; n_classes];
        let parent_value = row[feature];
        for j in evidence(descendants, row, positive_only) {
            let table = fitted.cache.feature_given_class_and_parent(&fitted.train, j, feature)?;
            for (class, p) in product.iter_mut().enumerate() {
                *p *= table.get(class, parent_value, row[j]);
            }
        }
        Ok(product)
    }
}

/// Members whose observed value is 1 when `positive_only` is set and at
/// least one such member exists; otherwise all members.
fn evidence(members: &[usize], row: ArrayView1<'_, u8>, positive_only: bool) -> Vec<usize> {
    let filter = positive_only && members.iter().any(|&m| row[m] == 1);
    members.iter().copied().filter(|&m| !filter || row[m] == 1).collect()
}

/// Index of the largest score; ties go to the lowest index.
pub fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (class, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = class;
        }
    }
    best
}

impl LazySelector for HieAode {
    fn fit(
        &mut self,
        x_train: ArrayView2<'_, u8>,
        y_train: &[usize],
        x_test: ArrayView2<'_, u8>,
        columns: Option<&[u32]>,
    ) -> Result<()> {
        HieAode::fit(self, x_train, y_train, x_test, columns)
    }

    fn select_and_predict(
        &self,
        predict: bool,
        save_features: bool,
        estimator: Option<&dyn Estimator>,
    ) -> Result<Vec<InstanceResult>> {
        HieAode::select_and_predict(self, predict, save_features, estimator)
    }
}
