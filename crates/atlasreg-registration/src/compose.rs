//! Recovery of the final affine from deformed mesh nodes.

use atlasreg_core::filter::{factors_as_scale, DownsampleFactors};
use atlasreg_core::spatial::scale_points;
use atlasreg_core::transform::{
    affine_from_point_correspondences, select_points, world_to_world_transform,
};
use atlasreg_core::{HomogeneousTransform, PointSet};

use crate::driver::check_indices;
use crate::error::{RegistrationError, Result};

/// Transforms produced by a registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistrationResult {
    /// Template voxels to subject voxels.
    pub image_to_image: HomogeneousTransform,
    /// Template world to subject world.
    pub world_to_world: HomogeneousTransform,
    /// Affine the optimizer added on top of the initial image-to-image
    /// transform, in subject voxels.
    pub extra: HomogeneousTransform,
}

/// Fits the affine that carries four sample nodes from their reference
/// positions to their optimized positions and folds it into the initial
/// transform.
#[derive(Debug, Clone, Copy)]
pub struct ResultComposer {
    indices: [usize; 4],
    factors: DownsampleFactors,
}

impl ResultComposer {
    pub fn new(indices: [usize; 4], factors: DownsampleFactors) -> Self {
        Self { indices, factors }
    }

    /// Compose the final transforms.
    ///
    /// Positions live on the decimated grid and are scaled up by the
    /// decimation factors before fitting. `initial_image_to_image` is the
    /// transform the mesh was placed with, including any accepted coarse
    /// translation.
    pub fn compose(
        &self,
        reference_positions: &PointSet,
        final_positions: &PointSet,
        initial_image_to_image: &HomogeneousTransform,
        template_voxel_to_world: &HomogeneousTransform,
        subject_voxel_to_world: &HomogeneousTransform,
    ) -> Result<RegistrationResult> {
        if reference_positions.nrows() != final_positions.nrows() {
            return Err(RegistrationError::ShapeMismatch {
                expected: vec![reference_positions.nrows(), 3],
                actual: vec![final_positions.nrows(), 3],
            });
        }
        check_indices(&self.indices, reference_positions.nrows())?;

        let scale = factors_as_scale(&self.factors);
        let y0 = scale_points(&select_points(reference_positions, &self.indices), &scale);
        let y = scale_points(&select_points(final_positions, &self.indices), &scale);
        let extra = affine_from_point_correspondences(&y0, &y)?;

        let image_to_image = extra.compose(initial_image_to_image);
        let world_to_world = world_to_world_transform(
            &image_to_image,
            template_voxel_to_world,
            subject_voxel_to_world,
        )?;

        let scalings = world_to_world.axis_scalings();
        tracing::info!(
            "world-to-world axis scalings {:.4} {:.4} {:.4}",
            scalings[0],
            scalings[1],
            scalings[2]
        );
        tracing::debug!("world-to-world transform:\n{}", world_to_world);

        Ok(RegistrationResult {
            image_to_image,
            world_to_world,
            extra,
        })
    }
}
