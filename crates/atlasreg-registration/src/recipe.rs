//! File-level registration: load inputs, register, write results.

use atlasreg_core::{HomogeneousTransform, Volume};
use atlasreg_io::{
    compose_qc_figure, read_volume, write_coregistration_matrices, write_lta, write_qc_figure,
    write_volume, CoregistrationMatrices, LinearTransformArray, QcFigureConfig, VolumeGeometry,
};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compose::RegistrationResult;
use crate::config::AtlasRegistrationConfig;
use crate::driver::OptimizationReport;
use crate::engine::{AtlasEngine, AtlasMesh};
use crate::error::{RegistrationError, Result};
use crate::pipeline::AtlasRegistration;
use crate::progress::LoggingObserver;

/// Name of the talairach LTA written next to the other results.
pub const TALAIRACH_LTA_FILE: &str = "samseg.talairach.lta";

/// Inputs and settings of one registration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecipe {
    pub image_file: PathBuf,
    pub mesh_collection_file: PathBuf,
    pub template_file: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub visualize: bool,
    /// Volume whose voxel grid the talairach LTA maps into.
    #[serde(default)]
    pub reference_volume: Option<PathBuf>,
    #[serde(default)]
    pub config: AtlasRegistrationConfig,
    #[serde(skip)]
    pub qc: QcFigureConfig,
}

impl RegistrationRecipe {
    pub fn new(
        image_file: impl Into<PathBuf>,
        mesh_collection_file: impl Into<PathBuf>,
        template_file: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image_file: image_file.into(),
            mesh_collection_file: mesh_collection_file.into(),
            template_file: template_file.into(),
            output_dir: output_dir.into(),
            visualize: false,
            reference_volume: None,
            config: AtlasRegistrationConfig::default(),
            qc: QcFigureConfig::default(),
        }
    }

    pub fn with_visualize(mut self, visualize: bool) -> Self {
        self.visualize = visualize;
        self
    }

    pub fn with_reference_volume(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_volume = Some(path.into());
        self
    }

    pub fn with_config(mut self, config: AtlasRegistrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_qc(mut self, qc: QcFigureConfig) -> Self {
        self.qc = qc;
        self
    }

    /// Load a recipe from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RegistrationError::input(path, e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| RegistrationError::input(path, e.to_string()))
    }

    /// Template file name without directory and NIfTI extension, plus the
    /// extension used for the coregistered template.
    pub fn template_base_name(&self) -> (String, &'static str) {
        let name = self
            .template_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(base) = name.strip_suffix(".nii.gz") {
            (base.to_string(), ".nii.gz")
        } else if let Some(base) = name.strip_suffix(".nii") {
            (base.to_string(), ".nii")
        } else {
            let base = Path::new(&name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or(name);
            (base, ".nii.gz")
        }
    }

    pub fn matrices_file(&self) -> PathBuf {
        let (base, _) = self.template_base_name();
        self.output_dir.join(format!("{}_coregistrationMatrices.json", base))
    }

    pub fn coregistered_template_file(&self) -> PathBuf {
        let (base, extension) = self.template_base_name();
        self.output_dir.join(format!("{}_coregistered{}", base, extension))
    }

    pub fn qc_figure_file(&self) -> PathBuf {
        let (base, _) = self.template_base_name();
        self.output_dir.join(format!("{}_coregistrationQcFigure.png", base))
    }
}

/// Files written by [`register_atlas`] and the transforms they hold.
#[derive(Debug, Clone)]
pub struct RegistrationOutputs {
    pub result: RegistrationResult,
    pub report: OptimizationReport,
    pub matrices_file: PathBuf,
    pub coregistered_template_file: PathBuf,
    pub qc_figure_file: PathBuf,
    pub lta_file: Option<PathBuf>,
}

fn load<B: Backend>(path: &Path, device: &B::Device) -> Result<Volume<B>> {
    read_volume::<B, _>(path, device).map_err(|e| RegistrationError::input(path, format!("{:#}", e)))
}

fn written(path: &Path) -> impl FnOnce(anyhow::Error) -> RegistrationError + '_ {
    move |e| RegistrationError::output(path, format!("{:#}", e))
}

/// Register the atlas described by `recipe` and write its results.
///
/// Nothing is written unless the registration and every derived output
/// (QC figure, talairach LTA) succeed.
pub fn register_atlas<B, E>(
    engine: E,
    recipe: &RegistrationRecipe,
    device: &B::Device,
) -> Result<RegistrationOutputs>
where
    B: Backend,
    E: AtlasEngine<B>,
{
    let subject = load::<B>(&recipe.image_file, device)?;
    let template = load::<B>(&recipe.template_file, device)?;
    let reference = recipe
        .reference_volume
        .as_deref()
        .map(|path| load::<B>(path, device).map(|volume| (path, volume)))
        .transpose()?;

    let mut registration =
        AtlasRegistration::new(engine, recipe.config.clone()).with_visualize(recipe.visualize);
    if recipe.visualize {
        registration = registration.with_observer(Arc::new(LoggingObserver::default()));
    }
    let outcome = registration.run(
        &subject,
        template.voxel_to_world(),
        &recipe.mesh_collection_file,
    )?;
    let result = outcome.result;

    // Everything fallible is computed before the first file is written.
    let matrices = CoregistrationMatrices {
        image_to_image: result.image_to_image,
        world_to_world: result.world_to_world,
    };
    // Template voxels placed directly in subject world space.
    let coregistered = template.with_voxel_to_world(subject.voxel_to_world().compose(&result.image_to_image));

    let qc_figure_file = recipe.qc_figure_file();
    let priors = outcome
        .mesh
        .rasterize(outcome.downsampled.shape(), device)?;
    let figure = compose_qc_figure(outcome.downsampled.data(), &priors, &recipe.qc)
        .map_err(written(&qc_figure_file))?;

    let lta = reference
        .map(|(reference_path, reference)| {
            talairach_lta(recipe, &subject, &template, reference_path, &reference, &result)
        })
        .transpose()?;

    let matrices_file = recipe.matrices_file();
    write_coregistration_matrices(&matrices_file, &matrices).map_err(written(&matrices_file))?;

    let coregistered_template_file = recipe.coregistered_template_file();
    write_volume(&coregistered_template_file, &coregistered).map_err(written(&coregistered_template_file))?;

    write_qc_figure(&qc_figure_file, &figure).map_err(written(&qc_figure_file))?;

    let lta_file = match lta {
        Some(lta) => {
            let lta_file = recipe.output_dir.join(TALAIRACH_LTA_FILE);
            write_lta(&lta_file, &lta).map_err(written(&lta_file))?;
            Some(lta_file)
        }
        None => None,
    };

    tracing::info!("registration results written to {}", recipe.output_dir.display());

    Ok(RegistrationOutputs {
        result,
        report: outcome.report,
        matrices_file,
        coregistered_template_file,
        qc_figure_file,
        lta_file,
    })
}

/// Subject voxels to reference voxels, through template world space.
fn talairach_lta<B: Backend>(
    recipe: &RegistrationRecipe,
    subject: &Volume<B>,
    template: &Volume<B>,
    reference_path: &Path,
    reference: &Volume<B>,
    result: &RegistrationResult,
) -> Result<LinearTransformArray> {
    let template_to_reference = reference
        .voxel_to_world()
        .inverse_for("reference image-to-world inverse")?
        .compose(template.voxel_to_world());
    let subject_to_template: HomogeneousTransform = result
        .image_to_image
        .inverse_for("image-to-image inverse")?;

    Ok(LinearTransformArray {
        vox_to_vox: template_to_reference.compose(&subject_to_template),
        source: VolumeGeometry::new(&recipe.image_file, subject.shape(), *subject.voxel_to_world()),
        destination: VolumeGeometry::new(reference_path, reference.shape(), *reference.voxel_to_world()),
        subject: "fsaverage".to_string(),
    })
}
