//! Linear transform array (LTA) text files.
//!
//! Writes the single-transform voxel-to-voxel flavour used to hand a
//! talairach-style registration to FreeSurfer tools.

use anyhow::{Context, Result};
use atlasreg_core::HomogeneousTransform;
use nalgebra::Vector3;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// LTA type code for a voxel-to-voxel transform.
const LINEAR_VOX_TO_VOX: u32 = 0;

/// Geometry block describing one side of the transform.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGeometry {
    pub filename: PathBuf,
    pub dims: [usize; 3],
    pub voxel_to_world: HomogeneousTransform,
}

impl VolumeGeometry {
    pub fn new(filename: impl Into<PathBuf>, dims: [usize; 3], voxel_to_world: HomogeneousTransform) -> Self {
        Self {
            filename: filename.into(),
            dims,
            voxel_to_world,
        }
    }

    /// Unit direction of each voxel axis in world space.
    fn axis_directions(&self) -> [Vector3<f64>; 3] {
        let linear = self.voxel_to_world.linear();
        let mut axes = [Vector3::zeros(); 3];
        for (i, axis) in axes.iter_mut().enumerate() {
            let column = linear.column(i).into_owned();
            let norm = column.norm();
            *axis = if norm > 1e-12 { column / norm } else { column };
        }
        axes
    }

    /// World coordinate of the volume centre voxel `dims / 2`.
    fn center(&self) -> Vector3<f64> {
        let half = Vector3::new(
            self.dims[0] as f64 / 2.0,
            self.dims[1] as f64 / 2.0,
            self.dims[2] as f64 / 2.0,
        );
        self.voxel_to_world.transform_point(&half)
    }

    fn write_block(&self, out: &mut String) {
        let spacing = self.voxel_to_world.voxel_spacing();
        let [x, y, z] = self.axis_directions();
        let c = self.center();
        let _ = writeln!(out, "valid = 1  # volume info valid");
        let _ = writeln!(out, "filename = {}", self.filename.display());
        let _ = writeln!(out, "volume = {} {} {}", self.dims[0], self.dims[1], self.dims[2]);
        let _ = writeln!(out, "voxelsize = {}", format_triplet(&spacing.0));
        let _ = writeln!(out, "xras   = {}", format_triplet(&x));
        let _ = writeln!(out, "yras   = {}", format_triplet(&y));
        let _ = writeln!(out, "zras   = {}", format_triplet(&z));
        let _ = writeln!(out, "c_ras  = {}", format_triplet(&c));
    }
}

/// A single voxel-to-voxel transform between two volumes.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTransformArray {
    pub vox_to_vox: HomogeneousTransform,
    pub source: VolumeGeometry,
    pub destination: VolumeGeometry,
    pub subject: String,
}

impl LinearTransformArray {
    /// Render the LTA text.
    pub fn to_lta_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# transform file");
        let _ = writeln!(out, "# created by atlasreg");
        let _ = writeln!(out, "type      = {} # LINEAR_VOX_TO_VOX", LINEAR_VOX_TO_VOX);
        let _ = writeln!(out, "nxforms   = 1");
        let _ = writeln!(out, "mean      = 0.0000 0.0000 0.0000");
        let _ = writeln!(out, "sigma     = 1.0000");
        let _ = writeln!(out, "1 4 4");
        for row in self.vox_to_vox.to_rows() {
            let cells: Vec<String> = row.iter().map(|v| format!("{:.15e}", v)).collect();
            let _ = writeln!(out, "{}", cells.join(" "));
        }
        let _ = writeln!(out, "src volume info");
        self.source.write_block(&mut out);
        let _ = writeln!(out, "dst volume info");
        self.destination.write_block(&mut out);
        let _ = writeln!(out, "subject {}", self.subject);
        out
    }
}

fn format_triplet(v: &Vector3<f64>) -> String {
    format!("{:.15e} {:.15e} {:.15e}", v[0], v[1], v[2])
}

/// Write an LTA file, creating parent directories.
pub fn write_lta(path: &Path, lta: &LinearTransformArray) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, lta.to_lta_string())
        .with_context(|| format!("Failed to write LTA {}", path.display()))?;
    tracing::info!("wrote LTA {}", path.display());
    Ok(())
}

/// Read the first 4×4 matrix of an LTA file.
pub fn read_lta_matrix(path: &Path) -> Result<HomogeneousTransform> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read LTA {}", path.display()))?;
    let mut lines = contents.lines().map(str::trim);
    lines
        .by_ref()
        .find(|line| *line == "1 4 4")
        .with_context(|| format!("No matrix header in {}", path.display()))?;

    let mut rows = [[0.0; 4]; 4];
    for row in rows.iter_mut() {
        let line = lines
            .next()
            .with_context(|| format!("Truncated matrix in {}", path.display()))?;
        let values: Vec<f64> = line
            .split_whitespace()
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("Malformed matrix row '{}' in {}", line, path.display()))?;
        if values.len() != 4 {
            anyhow::bail!("Expected 4 values per row in {}, got {}", path.display(), values.len());
        }
        row.copy_from_slice(&values);
    }
    Ok(HomogeneousTransform::from_rows(rows))
}
