//! Error types for atlas registration.

use atlasreg_core::AlgebraError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// An input file could not be read.
    #[error("Failed to load {path}: {message}")]
    Input { path: PathBuf, message: String },

    /// An output file could not be written.
    #[error("Failed to write {path}: {message}")]
    Output { path: PathBuf, message: String },

    /// A transform could not be composed or inverted.
    #[error(transparent)]
    Algebra(#[from] AlgebraError),

    /// The mesh engine failed to load, rasterize or update a mesh.
    #[error("Mesh error: {0}")]
    Mesh(String),

    /// The cost evaluator failed.
    #[error("Cost evaluator error: {0}")]
    Evaluator(String),

    /// The optimizer failed during a step.
    #[error("Optimizer error: {0}")]
    Optimizer(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create an input error for the given path.
    pub fn input(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Input {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an output error for the given path.
    pub fn output(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Output {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a mesh error.
    pub fn mesh(msg: impl Into<String>) -> Self {
        Self::Mesh(msg.into())
    }

    /// Create a cost evaluator error.
    pub fn evaluator(msg: impl Into<String>) -> Self {
        Self::Evaluator(msg.into())
    }

    /// Create an optimizer error.
    pub fn optimizer(msg: impl Into<String>) -> Self {
        Self::Optimizer(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
