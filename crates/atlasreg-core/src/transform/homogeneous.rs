//! 4×4 homogeneous affine transform.
//!
//! Column-vector convention: `y = M · [x; 1]`, the rightmost column holds
//! the translation and the bottom row is `[0, 0, 0, 1]`.

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::error::{AlgebraError, Result, DETERMINANT_TOLERANCE};
use crate::spatial::{PointSet, VoxelSpacing};

/// Affine transform stored as a homogeneous 4×4 matrix.
///
/// Serialized as four row arrays so files read the same way the matrix
/// is printed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 4]; 4]", into = "[[f64; 4]; 4]")]
pub struct HomogeneousTransform(Matrix4<f64>);

impl HomogeneousTransform {
    /// Wrap an existing homogeneous matrix.
    pub fn from_matrix(matrix: Matrix4<f64>) -> Self {
        Self(matrix)
    }

    /// Build from row-major components.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        Self(Matrix4::from_fn(|r, c| rows[r][c]))
    }

    /// Build from a linear part and a translation.
    pub fn from_parts(linear: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        Self(matrix)
    }

    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Pure translation.
    pub fn translation_transform(offset: Vector3<f64>) -> Self {
        Self::from_parts(Matrix3::identity(), offset)
    }

    /// Per-axis scaling about the origin.
    pub fn scaling(factors: [f64; 3]) -> Self {
        Self(Matrix4::from_diagonal(&Vector4::new(
            factors[0], factors[1], factors[2], 1.0,
        )))
    }

    /// Isotropic scaling about the origin.
    pub fn isotropic_scaling(factor: f64) -> Self {
        Self::scaling([factor; 3])
    }

    /// Rotation about the x axis, acting on the y/z rows and columns as
    /// `[[cos, -sin], [sin, cos]]`.
    pub fn rotation_x(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let mut matrix = Matrix4::identity();
        matrix[(1, 1)] = cos;
        matrix[(1, 2)] = -sin;
        matrix[(2, 1)] = sin;
        matrix[(2, 2)] = cos;
        Self(matrix)
    }

    /// The underlying matrix.
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    /// Row-major components.
    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = self.0[(r, c)];
            }
        }
        rows
    }

    /// Upper-left 3×3 block.
    pub fn linear(&self) -> Matrix3<f64> {
        self.0.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Rightmost column, first three rows.
    pub fn translation(&self) -> Vector3<f64> {
        self.0.fixed_view::<3, 1>(0, 3).into_owned()
    }

    pub fn set_translation(&mut self, translation: Vector3<f64>) {
        self.0.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
    }

    /// Add an offset to the translation column in place.
    pub fn translate(&mut self, offset: &Vector3<f64>) {
        let translation = self.translation() + offset;
        self.set_translation(translation);
    }

    /// Matrix product `self · other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Self) -> Self {
        Self(self.0 * other.0)
    }

    /// Inverse transform.
    ///
    /// Fails when the determinant magnitude is below
    /// [`DETERMINANT_TOLERANCE`].
    pub fn try_inverse(&self) -> Result<Self> {
        self.inverse_for("transform inverse")
    }

    /// Inverse transform, reporting `operation` on failure.
    pub fn inverse_for(&self, operation: &'static str) -> Result<Self> {
        invert(&self.0, operation).map(Self)
    }

    /// Apply to a single point.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.linear() * point + self.translation()
    }

    /// Apply to every row of a point set.
    pub fn transform_points(&self, points: &PointSet) -> PointSet {
        let linear = self.linear();
        let translation = self.translation();
        let mut out = points.clone();
        for (row, mut target) in points.row_iter().zip(out.row_iter_mut()) {
            let mapped = linear * row.transpose() + translation;
            target.copy_from(&mapped.transpose());
        }
        out
    }

    /// Voxel spacing when this transform maps voxel indices to world.
    pub fn voxel_spacing(&self) -> VoxelSpacing {
        VoxelSpacing::from_voxel_to_world(&self.0)
    }

    /// Singular values of the linear part, largest first.
    pub fn axis_scalings(&self) -> Vector3<f64> {
        let mut values = self.linear().singular_values();
        values
            .as_mut_slice()
            .sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        values
    }

    /// Element-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

impl Default for HomogeneousTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[[f64; 4]; 4]> for HomogeneousTransform {
    fn from(rows: [[f64; 4]; 4]) -> Self {
        Self::from_rows(rows)
    }
}

impl From<HomogeneousTransform> for [[f64; 4]; 4] {
    fn from(transform: HomogeneousTransform) -> Self {
        transform.to_rows()
    }
}

impl std::fmt::Display for HomogeneousTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for r in 0..4 {
            writeln!(
                f,
                "[{:>12.6} {:>12.6} {:>12.6} {:>12.6}]",
                self.0[(r, 0)],
                self.0[(r, 1)],
                self.0[(r, 2)],
                self.0[(r, 3)]
            )?;
        }
        Ok(())
    }
}

/// Invert a 4×4 matrix, rejecting near-singular input.
pub(crate) fn invert(matrix: &Matrix4<f64>, operation: &'static str) -> Result<Matrix4<f64>> {
    let determinant = matrix.determinant();
    if !determinant.is_finite() || determinant.abs() < DETERMINANT_TOLERANCE {
        return Err(AlgebraError::singular(operation, determinant));
    }
    matrix
        .try_inverse()
        .ok_or_else(|| AlgebraError::singular(operation, determinant))
}
