//! Contracts shared with the surrounding selection pipeline.
//!
//! Lazy selectors pick evidence per test row instead of once for the whole
//! data set. Eager selectors elsewhere hand a reduced matrix to a downstream
//! [`Estimator`]; the Bayesian selectors here classify by themselves and
//! accept an estimator only to keep the same call shape.

use ndarray::ArrayView2;

use crate::engine::InstanceResult;
use crate::errors::Result;

/// Downstream classifier trained on selected features.
///
/// Implemented by callers. Selectors in this crate only read [`name`] for
/// logging; `fit` and `predict` are driven by the calling pipeline.
///
/// [`name`]: Estimator::name
pub trait Estimator: Send + Sync {
    /// Human readable name, for logging.
    fn name(&self) -> &str {
        "estimator"
    }

    fn fit(&mut self, x: ArrayView2<'_, u8>, y: &[usize]) -> Result<()>;

    fn predict(&self, x: ArrayView2<'_, u8>) -> Result<Vec<usize>>;
}

/// Selector that sees the test rows at fit time.
pub trait LazySelector {
    /// Bind training data, labels, test rows and the column-to-node mapping.
    fn fit(
        &mut self,
        x_train: ArrayView2<'_, u8>,
        y_train: &[usize],
        x_test: ArrayView2<'_, u8>,
        columns: Option<&[u32]>,
    ) -> Result<()>;

    /// One prediction per test row when `predict` is set, otherwise empty.
    fn select_and_predict(
        &self,
        predict: bool,
        save_features: bool,
        estimator: Option<&dyn Estimator>,
    ) -> Result<Vec<InstanceResult>>;
}
