use anyhow::Result;
use atlasreg_core::filter::{plan_downsampling, DownsampleFilter};
use atlasreg_io::{read_volume, write_coregistration_matrices, CoregistrationMatrices};
use atlasreg_registration::{
    AtlasRegistrationConfig, InitialPoseBuilder, InitialPoseConfig, RegistrationRecipe,
};
use burn_ndarray::NdArray;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

type Backend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "atlasreg")]
#[command(about = "Affine registration of a probabilistic atlas to a subject volume")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the decimation a subject volume would get
    Plan {
        /// Subject NIfTI volume
        image: PathBuf,

        /// Target isotropic spacing in mm
        #[arg(short, long, default_value_t = 3.0)]
        target_spacing: f64,
    },

    /// Compute the initial world-to-world and image-to-image transforms
    InitialPose {
        /// Subject NIfTI volume
        image: PathBuf,

        /// Atlas template NIfTI volume
        template: PathBuf,

        /// Rotation about the x axis in degrees
        #[arg(long, default_value_t = 10.0)]
        rotation: f64,

        /// Isotropic scaling
        #[arg(long, default_value_t = 0.9)]
        scaling: f64,

        /// Write both matrices to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print a registration recipe with default settings as JSON
    DefaultRecipe {
        /// Subject NIfTI volume
        #[arg(long, default_value = "t1.nii.gz")]
        image: PathBuf,

        /// Mesh collection file
        #[arg(long, default_value = "atlas_level1.txt.gz")]
        mesh_collection: PathBuf,

        /// Atlas template NIfTI volume
        #[arg(long, default_value = "template.nii")]
        template: PathBuf,

        /// Output directory
        #[arg(long, default_value = "out")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            image,
            target_spacing,
        } => {
            plan(&image, target_spacing)?;
        }
        Commands::InitialPose {
            image,
            template,
            rotation,
            scaling,
            output,
        } => {
            let pose = InitialPoseConfig {
                rotation_degrees: rotation,
                scaling,
            };
            initial_pose(&image, &template, pose, output.as_deref())?;
        }
        Commands::DefaultRecipe {
            image,
            mesh_collection,
            template,
            output_dir,
        } => {
            let recipe = RegistrationRecipe::new(image, mesh_collection, template, output_dir);
            println!("{}", serde_json::to_string_pretty(&recipe)?);
        }
    }

    Ok(())
}

fn plan(image: &Path, target_spacing: f64) -> Result<()> {
    let config = AtlasRegistrationConfig::default().with_target_spacing(target_spacing);
    config.validate()?;

    let device = Default::default();
    let volume = read_volume::<Backend, _>(image, &device)?;
    let factors = plan_downsampling(volume.voxel_to_world(), target_spacing);
    let filter = DownsampleFilter::<Backend>::new(factors);
    let stiffness = InitialPoseBuilder::from_config(&config).mesh_stiffness(&factors);

    info!("Planned decimation for {}", image.display());
    println!("spacing (mm):       {:?}", volume.spacing().to_array());
    println!("shape:              {:?}", volume.shape());
    println!("factors:            {:?}", factors);
    println!("downsampled shape:  {:?}", filter.output_shape(volume.shape()));
    println!("mesh stiffness:     {:e}", stiffness);
    Ok(())
}

fn initial_pose(
    image: &Path,
    template: &Path,
    pose: InitialPoseConfig,
    output: Option<&Path>,
) -> Result<()> {
    let config = AtlasRegistrationConfig::default().with_initial_pose(pose);
    config.validate()?;

    let device = Default::default();
    let subject = read_volume::<Backend, _>(image, &device)?;
    let template = read_volume::<Backend, _>(template, &device)?;
    let factors = plan_downsampling(subject.voxel_to_world(), config.target_spacing);

    let initial = InitialPoseBuilder::from_config(&config).build(
        template.voxel_to_world(),
        subject.voxel_to_world(),
        &factors,
    )?;

    println!("world-to-world:\n{}", initial.world_to_world);
    println!("image-to-image:\n{}", initial.image_to_image);
    println!("mesh stiffness: {:e}", initial.mesh_stiffness);

    if let Some(path) = output {
        write_coregistration_matrices(
            path,
            &CoregistrationMatrices {
                image_to_image: initial.image_to_image,
                world_to_world: initial.world_to_world,
            },
        )?;
        info!("Initial pose written to {}", path.display());
    }
    Ok(())
}
