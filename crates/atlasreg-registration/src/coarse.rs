//! Coarse alignment by matching centres of mass.
//!
//! The mesh is shifted so that the centre of mass of its foreground priors
//! lands on the intensity centre of mass of the image. The shift is kept only
//! if the registration cost does not get worse.

use atlasreg_core::filter::{center_of_mass, sum_classes_from, DownsampleFactors};
use atlasreg_core::spatial::translate_points;
use atlasreg_core::transform::offset_between;
use atlasreg_core::{HomogeneousTransform, Volume};
use burn::tensor::backend::Backend;
use nalgebra::Vector3;

use crate::engine::{AtlasMesh, CostEvaluator};
use crate::error::{RegistrationError, Result};

/// What coarse alignment did to the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoarseOutcome {
    /// The translated mesh scored no worse and was kept.
    Accepted {
        /// Translation on the decimated grid, in voxels.
        translation: Vector3<f64>,
        cost_before: f64,
        cost_after: f64,
    },
    /// The translated mesh scored worse; positions were restored.
    Rejected {
        translation: Vector3<f64>,
        cost_before: f64,
        cost_after: f64,
    },
    /// A centre of mass was undefined, so there was nothing to try.
    Skipped { cost: f64 },
}

impl CoarseOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Centre-of-mass based initialization of the mesh position.
#[derive(Debug, Clone, Copy)]
pub struct CoarseAligner {
    factors: DownsampleFactors,
    first_foreground_class: usize,
}

impl CoarseAligner {
    /// # Arguments
    /// * `factors` - Decimation factors between the subject grid and the grid
    ///   the mesh lives on
    /// * `first_foreground_class` - Classes from this index on are summed to
    ///   locate the atlas
    pub fn new(factors: DownsampleFactors, first_foreground_class: usize) -> Self {
        Self {
            factors,
            first_foreground_class,
        }
    }

    /// Try one centre-of-mass translation of the mesh.
    ///
    /// On acceptance the translation, scaled back up by the decimation
    /// factors, is added to the translation column of `image_to_image`. On
    /// rejection the mesh gets back exactly the positions it had on entry
    /// and `image_to_image` is untouched.
    pub fn align<B, M, E>(
        &self,
        image: &Volume<B>,
        mesh: &mut M,
        evaluator: &mut E,
        image_to_image: &mut HomogeneousTransform,
    ) -> Result<CoarseOutcome>
    where
        B: Backend,
        M: AtlasMesh<B>,
        E: CostEvaluator<M>,
    {
        let cost_before = evaluator.evaluate(mesh)?.cost;

        let Some(image_center) = center_of_mass(image.data()) else {
            tracing::warn!("image has no mass, skipping coarse alignment");
            return Ok(CoarseOutcome::Skipped { cost: cost_before });
        };

        let shape = image.shape();
        let priors = mesh.rasterize(shape, &image.device())?;
        let [px, py, pz, _] = priors.dims();
        if [px, py, pz] != shape {
            return Err(RegistrationError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![px, py, pz],
            });
        }

        let mesh_center = sum_classes_from(&priors, self.first_foreground_class)
            .and_then(|foreground| center_of_mass(&foreground));
        let Some(mesh_center) = mesh_center else {
            tracing::warn!(
                "atlas has no mass in classes {}.., skipping coarse alignment",
                self.first_foreground_class
            );
            return Ok(CoarseOutcome::Skipped { cost: cost_before });
        };

        let translation = offset_between(&mesh_center, &image_center);
        let positions = mesh.positions();
        mesh.set_positions(&translate_points(&positions, &translation))?;
        let cost_after = evaluator.evaluate(mesh)?.cost;

        tracing::info!(
            "centre-of-mass translation {:?} voxels: cost {} -> {}",
            translation.as_slice(),
            cost_before,
            cost_after
        );

        if cost_after <= cost_before {
            let full_resolution = Vector3::from_fn(|i, _| self.factors[i] as f64 * translation[i]);
            image_to_image.translate(&full_resolution);
            tracing::info!("coarse alignment accepted");
            Ok(CoarseOutcome::Accepted {
                translation,
                cost_before,
                cost_after,
            })
        } else {
            mesh.set_positions(&positions)?;
            tracing::info!("coarse alignment rejected, mesh restored");
            Ok(CoarseOutcome::Rejected {
                translation,
                cost_before,
                cost_after,
            })
        }
    }
}
