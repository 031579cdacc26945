//! Initial placement of the atlas in the subject.

use atlasreg_core::filter::DownsampleFactors;
use atlasreg_core::transform::image_to_image_transform;
use atlasreg_core::HomogeneousTransform;

use crate::config::{AtlasRegistrationConfig, InitialPoseConfig};
use crate::error::Result;

/// Starting transforms and mesh stiffness of a registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialPose {
    /// Guess of the template-world to subject-world transform.
    pub world_to_world: HomogeneousTransform,
    /// Template voxels to subject voxels implied by `world_to_world`.
    pub image_to_image: HomogeneousTransform,
    pub mesh_stiffness: f64,
}

/// Builds the initial pose from a rotation about x and an isotropic scaling.
#[derive(Debug, Clone, Copy)]
pub struct InitialPoseBuilder {
    pose: InitialPoseConfig,
    base_stiffness: f64,
}

impl InitialPoseBuilder {
    pub fn new(pose: InitialPoseConfig, base_stiffness: f64) -> Self {
        Self {
            pose,
            base_stiffness,
        }
    }

    pub fn from_config(config: &AtlasRegistrationConfig) -> Self {
        Self::new(config.initial_pose, config.mesh_stiffness)
    }

    /// `S · R`: rotate about x, then scale.
    pub fn world_to_world(&self) -> HomogeneousTransform {
        let rotation = HomogeneousTransform::rotation_x(self.pose.rotation_degrees);
        HomogeneousTransform::isotropic_scaling(self.pose.scaling).compose(&rotation)
    }

    /// Stiffness compensated for the atlas scaling and for the coarser grid
    /// the mesh is deformed on: `K / s³ · ∏ factors`.
    pub fn mesh_stiffness(&self, factors: &DownsampleFactors) -> f64 {
        let volume_change: f64 = factors.iter().map(|&f| f as f64).product();
        self.base_stiffness / self.pose.scaling.powi(3) * volume_change
    }

    /// Assemble the initial pose for a template and subject pair.
    pub fn build(
        &self,
        template_voxel_to_world: &HomogeneousTransform,
        subject_voxel_to_world: &HomogeneousTransform,
        factors: &DownsampleFactors,
    ) -> Result<InitialPose> {
        let world_to_world = self.world_to_world();
        let image_to_image = image_to_image_transform(
            &world_to_world,
            template_voxel_to_world,
            subject_voxel_to_world,
        )?;
        let mesh_stiffness = self.mesh_stiffness(factors);

        tracing::info!(
            "initial pose: rotation {}° about x, scaling {}, mesh stiffness {:e}",
            self.pose.rotation_degrees,
            self.pose.scaling,
            mesh_stiffness
        );
        tracing::debug!("initial image-to-image transform:\n{}", image_to_image);

        Ok(InitialPose {
            world_to_world,
            image_to_image,
            mesh_stiffness,
        })
    }
}
