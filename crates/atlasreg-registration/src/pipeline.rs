//! End-to-end affine atlas registration.

use atlasreg_core::filter::{inverse_factors, plan_downsampling, DownsampleFactors, DownsampleFilter};
use atlasreg_core::{HomogeneousTransform, Volume};
use burn::tensor::backend::Backend;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use crate::coarse::{CoarseAligner, CoarseOutcome};
use crate::compose::{RegistrationResult, ResultComposer};
use crate::config::{AtlasRegistrationConfig, OptimizerSettings};
use crate::driver::{check_indices, OptimizationDriver, OptimizationReport};
use crate::engine::{AtlasEngine, AtlasMesh};
use crate::error::Result;
use crate::pose::{InitialPose, InitialPoseBuilder};
use crate::progress::StepObserver;

/// Everything a registration run produced.
pub struct RegistrationOutcome<B: Backend, M> {
    pub result: RegistrationResult,
    pub initial_pose: InitialPose,
    pub factors: DownsampleFactors,
    pub coarse: CoarseOutcome,
    pub report: OptimizationReport,
    /// The optimized mesh, on the decimated grid.
    pub mesh: M,
    /// The decimated subject the mesh was fitted to.
    pub downsampled: Volume<B>,
}

/// Registers an atlas mesh collection to a subject volume.
///
/// # Example
/// ```ignore
/// let registration = AtlasRegistration::new(engine, AtlasRegistrationConfig::default());
/// let outcome = registration.run(&subject, template.voxel_to_world(), &mesh_path)?;
/// println!("{}", outcome.result.world_to_world);
/// ```
pub struct AtlasRegistration<B: Backend, E: AtlasEngine<B>> {
    engine: E,
    config: AtlasRegistrationConfig,
    observer: Option<Arc<dyn StepObserver>>,
    visualize: bool,
    _b: PhantomData<B>,
}

impl<B: Backend, E: AtlasEngine<B>> AtlasRegistration<B, E> {
    pub fn new(engine: E, config: AtlasRegistrationConfig) -> Self {
        Self {
            engine,
            config,
            observer: None,
            visualize: false,
            _b: PhantomData,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Log the implied axis scalings after every optimizer step and ask the
    /// optimizer for verbose output.
    pub fn with_visualize(mut self, visualize: bool) -> Self {
        self.visualize = visualize;
        self
    }

    /// Run the registration.
    ///
    /// # Arguments
    /// * `subject` - Full-resolution subject volume
    /// * `template_voxel_to_world` - Voxel-to-world transform of the atlas template
    /// * `mesh_collection` - Mesh collection file handed to the engine
    pub fn run(
        &self,
        subject: &Volume<B>,
        template_voxel_to_world: &HomogeneousTransform,
        mesh_collection: &Path,
    ) -> Result<RegistrationOutcome<B, E::Mesh>> {
        let config = &self.config;
        config.validate()?;
        let subject_voxel_to_world = subject.voxel_to_world();

        let factors = plan_downsampling(subject_voxel_to_world, config.target_spacing);
        tracing::info!("downsampling factors {:?}", factors);

        let initial_pose = InitialPoseBuilder::from_config(config).build(
            template_voxel_to_world,
            subject_voxel_to_world,
            &factors,
        )?;

        let mut mesh = self.engine.load_mesh_collection(
            mesh_collection,
            &initial_pose.image_to_image,
            initial_pose.mesh_stiffness,
        )?;
        tracing::info!(
            "loaded mesh with {} nodes and {} classes from {}",
            mesh.node_count(),
            mesh.class_count(),
            mesh_collection.display()
        );

        let downsampled = DownsampleFilter::new(factors).apply(subject);
        mesh.scale(inverse_factors(&factors))?;

        let rest_positions = mesh.positions();
        check_indices(&config.sample_node_indices, rest_positions.nrows())?;

        let mut evaluator = self.engine.cost_evaluator(&downsampled)?;
        let mut image_to_image = initial_pose.image_to_image;
        let coarse = CoarseAligner::new(factors, config.first_foreground_class).align(
            &downsampled,
            &mut mesh,
            &mut evaluator,
            &mut image_to_image,
        )?;

        // The affine is measured from where optimization starts; an accepted
        // coarse translation is already part of `image_to_image`.
        let reference_positions = mesh.positions();

        let settings = OptimizerSettings {
            verbose: config.optimizer.verbose || self.visualize,
            ..config.optimizer
        };
        let mut optimizer = self.engine.optimizer(evaluator, &settings)?;
        let mut driver = OptimizationDriver::<B>::new();
        if let Some(observer) = &self.observer {
            driver = driver.with_observer(Arc::clone(observer));
        }
        if self.visualize {
            driver = driver.with_scaling_diagnostics(
                &reference_positions,
                config.sample_node_indices,
                &factors,
            )?;
        }
        let report = driver.run(&mut mesh, &mut optimizer, &rest_positions)?;

        let result = ResultComposer::new(config.sample_node_indices, factors).compose(
            &reference_positions,
            &mesh.positions(),
            &image_to_image,
            template_voxel_to_world,
            subject_voxel_to_world,
        )?;

        Ok(RegistrationOutcome {
            result,
            initial_pose,
            factors,
            coarse,
            report,
            mesh,
            downsampled,
        })
    }
}
