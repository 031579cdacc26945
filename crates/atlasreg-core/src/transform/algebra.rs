//! Transform algebra across world, template-image and subject-image spaces.

use nalgebra::{Matrix4, Vector3};

use super::homogeneous::{invert, HomogeneousTransform};
use crate::error::{AlgebraError, Result};
use crate::spatial::PointSet;

/// Number of point correspondences that determine a 3-D affine transform.
pub const CORRESPONDENCE_POINTS: usize = 4;

/// Derive the image-to-image transform between a template and a subject.
///
/// Returns `C = subject⁻¹ · (world_to_world · template)`, so that mapping a
/// template voxel through `C` and then `subject` lands at the same world
/// point as mapping it through `template` and then `world_to_world`.
///
/// # Arguments
/// * `world_to_world` - Transform between the two physical spaces
/// * `template_image_to_world` - Template voxel-to-world transform
/// * `subject_image_to_world` - Subject voxel-to-world transform
pub fn image_to_image_transform(
    world_to_world: &HomogeneousTransform,
    template_image_to_world: &HomogeneousTransform,
    subject_image_to_world: &HomogeneousTransform,
) -> Result<HomogeneousTransform> {
    let subject_inverse = subject_image_to_world.inverse_for("subject image-to-world inverse")?;
    Ok(subject_inverse.compose(&world_to_world.compose(template_image_to_world)))
}

/// Map an image-to-image transform back to world-to-world:
/// `subject · image_to_image · template⁻¹`.
pub fn world_to_world_transform(
    image_to_image: &HomogeneousTransform,
    template_image_to_world: &HomogeneousTransform,
    subject_image_to_world: &HomogeneousTransform,
) -> Result<HomogeneousTransform> {
    let template_inverse =
        template_image_to_world.inverse_for("template image-to-world inverse")?;
    Ok(subject_image_to_world
        .compose(image_to_image)
        .compose(&template_inverse))
}

/// Recover the affine transform that maps four reference points onto four
/// moved points.
///
/// Both sets are padded with a row of ones into 4×4 homogeneous matrices
/// `Y0` and `Y`; the result is `Y · Y0⁻¹`. Collinear or coplanar reference
/// points make `Y0` singular.
pub fn affine_from_point_correspondences(
    reference: &PointSet,
    moved: &PointSet,
) -> Result<HomogeneousTransform> {
    let y0 = homogeneous_columns(reference)?;
    let y = homogeneous_columns(moved)?;
    let y0_inverse = invert(&y0, "point correspondence inverse")?;
    Ok(HomogeneousTransform::from_matrix(y * y0_inverse))
}

/// Stack four points as homogeneous columns.
fn homogeneous_columns(points: &PointSet) -> Result<Matrix4<f64>> {
    if points.nrows() != CORRESPONDENCE_POINTS {
        return Err(AlgebraError::PointCountMismatch {
            operation: "point correspondence",
            expected: CORRESPONDENCE_POINTS,
            actual: points.nrows(),
        });
    }
    let mut columns = Matrix4::from_element(1.0);
    for (i, point) in points.row_iter().enumerate() {
        columns
            .fixed_view_mut::<3, 1>(0, i)
            .copy_from(&point.transpose());
    }
    Ok(columns)
}

/// Pick the given rows out of a point set.
pub fn select_points(points: &PointSet, indices: &[usize]) -> PointSet {
    PointSet::from_fn(indices.len(), |row, axis| points[(indices[row], axis)])
}

/// Translation that moves `from` onto `to`.
pub fn offset_between(from: &[f64; 3], to: &[f64; 3]) -> Vector3<f64> {
    Vector3::new(to[0] - from[0], to[1] - from[1], to[2] - from[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::point_set_from_points;

    fn tetrahedron() -> PointSet {
        point_set_from_points(&[
            [0.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [0.0, 10.0, 0.0],
            [0.0, 0.0, 10.0],
        ])
    }

    #[test]
    fn test_image_to_image_identity_spaces() {
        let w2w = HomogeneousTransform::isotropic_scaling(0.9);
        let identity = HomogeneousTransform::identity();
        let c = image_to_image_transform(&w2w, &identity, &identity).unwrap();
        assert!(c.approx_eq(&w2w, 1e-12));
    }

    #[test]
    fn test_image_to_image_consistency() {
        // subject · C == w2w · template
        let w2w = HomogeneousTransform::rotation_x(10.0)
            .compose(&HomogeneousTransform::isotropic_scaling(0.9));
        let template = HomogeneousTransform::from_rows([
            [1.0, 0.0, 0.0, -90.0],
            [0.0, 1.0, 0.0, -126.0],
            [0.0, 0.0, 1.0, -72.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let subject = HomogeneousTransform::from_rows([
            [-1.2, 0.0, 0.0, 100.0],
            [0.0, 0.0, 1.0, -120.0],
            [0.0, -1.0, 0.0, 110.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let c = image_to_image_transform(&w2w, &template, &subject).unwrap();
        let lhs = subject.compose(&c);
        let rhs = w2w.compose(&template);
        assert!(lhs.approx_eq(&rhs, 1e-9));

        let back = world_to_world_transform(&c, &template, &subject).unwrap();
        assert!(back.approx_eq(&w2w, 1e-9));
    }

    #[test]
    fn test_singular_subject_reports_operation() {
        let singular = HomogeneousTransform::scaling([1.0, 1.0, 0.0]);
        let identity = HomogeneousTransform::identity();
        let err = image_to_image_transform(&identity, &identity, &singular).unwrap_err();
        assert_eq!(err.operation(), "subject image-to-world inverse");
    }

    #[test]
    fn test_affine_recovery_exact() {
        let truth = HomogeneousTransform::from_rows([
            [1.1, 0.05, 0.0, 2.0],
            [-0.02, 0.95, 0.1, -3.0],
            [0.0, 0.03, 1.02, 0.5],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let reference = tetrahedron();
        let moved = truth.transform_points(&reference);
        let recovered = affine_from_point_correspondences(&reference, &moved).unwrap();
        assert!(recovered.approx_eq(&truth, 1e-9));
    }

    #[test]
    fn test_affine_recovery_coplanar_fails() {
        let coplanar = point_set_from_points(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ]);
        let err = affine_from_point_correspondences(&coplanar, &coplanar).unwrap_err();
        assert!(matches!(err, AlgebraError::Singular { .. }));
    }

    #[test]
    fn test_affine_recovery_wrong_count() {
        let three = point_set_from_points(&[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let err = affine_from_point_correspondences(&three, &three).unwrap_err();
        assert!(matches!(err, AlgebraError::PointCountMismatch { actual: 3, .. }));
    }

    #[test]
    fn test_select_points() {
        let points = tetrahedron();
        let picked = select_points(&points, &[3, 1]);
        assert_eq!(picked.nrows(), 2);
        assert_eq!(picked[(0, 2)], 10.0);
        assert_eq!(picked[(1, 0)], 10.0);
    }
}
