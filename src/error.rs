//! Error types for Trueno-DP
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-DP error types
#[derive(Error, Debug)]
pub enum Error {
    /// Schema and stored data disagree, or an operation does not apply to the attribute type
    #[error("Dataset type mismatch for attribute '{attribute}': expected {expected}, found {found}")]
    DatasetTypeMismatch {
        /// Attribute name
        attribute: String,
        /// Type the operation or schema requires
        expected: String,
        /// Type actually encountered
        found: String,
    },

    /// Decode of a code the mapping never assigned
    #[error("Unknown code {code} for attribute '{attribute}'\nCodes are only valid for the mapping that produced them.")]
    UnknownCode {
        /// Attribute name
        attribute: String,
        /// Offending code
        code: u32,
    },

    /// Encode of a value never observed for the attribute
    #[error("Value {value} was never observed for attribute '{attribute}'")]
    UnknownValue {
        /// Attribute name
        attribute: String,
        /// Offending value (display form)
        value: String,
    },

    /// Attribute name not present (or excluded)
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// Discretization left no attributes to work with
    #[error("Empty domain: no attributes remain after exclusion")]
    EmptyDomain,

    /// Depth bounds cannot be satisfied
    #[error("Invalid depth range: min_depth={min_depth}, max_depth={max_depth}\nRequire 1 <= min_depth <= max_depth and no more forced attributes than max_depth.")]
    InvalidDepthRange {
        /// Requested minimum depth
        min_depth: usize,
        /// Requested maximum depth
        max_depth: usize,
    },

    /// Unrecognized randomization method name
    #[error("Unsupported randomization mechanism: '{0}' (expected \"flip\" or \"resample\")")]
    UnsupportedMechanism(String),

    /// Operation has no budgeted implementation
    #[error("Not yet supported: {0}")]
    NotYetSupported(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Sampling cancelled between depth levels
    #[error("Sampling cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow/Parquet error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
