//! Error types for transform algebra and volume buffers.

use thiserror::Error;

/// Determinants with a magnitude below this value are treated as singular.
pub const DETERMINANT_TOLERANCE: f64 = 1e-12;

/// Errors raised by matrix composition and inversion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlgebraError {
    /// A matrix that had to be inverted is singular.
    #[error("Singular matrix in {operation} (determinant {determinant:e})")]
    Singular {
        operation: &'static str,
        determinant: f64,
    },

    /// A point set does not have the number of points an operation needs.
    #[error("Point count mismatch in {operation}: expected {expected}, got {actual}")]
    PointCountMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// A tensor buffer could not be read back as `f32` values.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to read {what} buffer: {message}")]
pub struct BufferError {
    pub what: &'static str,
    pub message: String,
}

/// Result type for transform algebra.
pub type Result<T> = std::result::Result<T, AlgebraError>;

impl AlgebraError {
    /// Create a singular-matrix error for the named operation.
    pub fn singular(operation: &'static str, determinant: f64) -> Self {
        Self::Singular {
            operation,
            determinant,
        }
    }

    /// Name of the operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Singular { operation, .. } => operation,
            Self::PointCountMismatch { operation, .. } => operation,
        }
    }
}
