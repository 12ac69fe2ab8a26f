//! Error types for hierarchy handling and lazy inference.
//!
//! Fatal problems (bad shapes, cyclic hierarchies, unfitted engines) surface as
//! [`HfsError`]. Problems confined to a single test row surface as
//! [`InstanceError`] so the rest of the batch still gets a prediction.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HfsError {
    #[error("Shape mismatch: {what} (expected {expected}, got {actual})")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Non-binary value {value} at row {row}, column {column}")]
    NonBinaryValue { row: usize, column: usize, value: u8 },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Hierarchy contains a cycle through node {0}")]
    CycleDetected(u32),

    #[error("Node {0} is not part of the hierarchy")]
    UnknownNode(u32),

    #[error("Node {0} is mapped to more than one column")]
    DuplicateColumn(u32),

    #[error("Feature {0} out of bounds (feature count: {1})")]
    FeatureOutOfBounds(usize, usize),

    #[error("Feature {0} cannot be conditioned on itself")]
    SelfInteraction(usize),

    #[error("Engine has not been fitted")]
    NotFitted,

    #[error("Variant {0} is not implemented")]
    VariantNotImplemented(&'static str),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HfsError>;

/// Failure scoring one test row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    #[error("Row {row}: non-binary value {value} in column {column}")]
    NonBinaryValue { row: usize, column: usize, value: u8 },
}
