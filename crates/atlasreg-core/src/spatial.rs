//! Spatial value types shared by the registration stages.
//!
//! Voxel spacing is derived from a voxel-to-world matrix; point sets hold
//! one 3-D coordinate per row (mesh node positions, sample points).

use nalgebra::{Matrix4, MatrixXx3, Vector3};
use serde::{Deserialize, Serialize};

/// N×3 set of points, one point per row.
pub type PointSet = MatrixXx3<f64>;

/// Physical distance between adjacent voxels along each axis, in mm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelSpacing(pub Vector3<f64>);

impl VoxelSpacing {
    /// Create spacing from per-axis components.
    pub fn new(components: [f64; 3]) -> Self {
        Self(Vector3::from(components))
    }

    /// Spacing implied by a voxel-to-world matrix: the norm of each of the
    /// first three columns.
    pub fn from_voxel_to_world(matrix: &Matrix4<f64>) -> Self {
        let mut spacing = Vector3::zeros();
        for axis in 0..3 {
            spacing[axis] = matrix.fixed_view::<3, 1>(0, axis).norm();
        }
        Self(spacing)
    }

    /// Components as an array, in native axis order.
    pub fn to_array(&self) -> [f64; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }
}

impl std::ops::Index<usize> for VoxelSpacing {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Build a point set from a slice of coordinates.
pub fn point_set_from_points(points: &[[f64; 3]]) -> PointSet {
    PointSet::from_fn(points.len(), |row, axis| points[row][axis])
}

/// Add the same offset to every point.
pub fn translate_points(points: &PointSet, offset: &Vector3<f64>) -> PointSet {
    let mut translated = points.clone();
    let row = offset.transpose();
    for mut point in translated.row_iter_mut() {
        point += row;
    }
    translated
}

/// Multiply each coordinate axis by its own factor.
pub fn scale_points(points: &PointSet, factors: &[f64; 3]) -> PointSet {
    let mut scaled = points.clone();
    for (axis, factor) in factors.iter().enumerate() {
        scaled.column_mut(axis).scale_mut(*factor);
    }
    scaled
}
