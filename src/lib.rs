//! Hierarchy-aware lazy feature selection.
//!
//! - [`hierarchy`]: immutable feature DAG and its transitive closure
//! - [`normalize`]: shrink / connect / virtual root / aggregated values
//! - [`relevance`]: relevance, information gain, gain ratio
//! - [`cpt`]: lazily filled conditional probability tables
//! - [`engine`]: the HieAODE family of lazy Bayesian classifiers
//!
//! Python bindings live behind the `python` feature.

pub mod config;
pub mod cpt;
pub mod dataset;
pub mod engine;
mod errors;
pub mod hierarchy;
pub mod normalize;
pub mod relevance;
pub mod selector;

#[cfg(feature = "python")]
mod python;

pub use config::EngineConfig;
pub use cpt::{CptCache, Smoothing};
pub use dataset::TrainingSet;
pub use engine::{EmptyEvidence, HieAode, InstanceResult, InstanceScores, Variant};
pub use errors::{HfsError, InstanceError, Result};
pub use hierarchy::{AncestorIndex, Hierarchy};
pub use normalize::{add_virtual_root_node, compute_aggregated_values, connect, shrink};
pub use relevance::{gain_ratio, information_gain, relevance, relevance_scores};
pub use selector::{Estimator, LazySelector};
