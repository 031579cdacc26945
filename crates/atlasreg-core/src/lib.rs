//! Core types for affine atlas registration.
//!
//! Homogeneous transform algebra, voxel volumes carrying their
//! voxel-to-world transform, and the resolution planning/decimation used
//! before mesh-based optimization.

pub mod error;
pub mod spatial;
pub mod transform;
pub mod volume;
pub mod filter;

pub use error::{AlgebraError, BufferError, Result};
pub use spatial::{PointSet, VoxelSpacing};
pub use transform::HomogeneousTransform;
pub use volume::Volume;
