//! Persisted registration matrices.

use anyhow::{Context, Result};
use atlasreg_core::HomogeneousTransform;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// The two matrices a registration run produces.
///
/// `image_to_image` maps template voxels to subject voxels;
/// `world_to_world` maps template world coordinates to subject world
/// coordinates and is the identity when nothing moved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoregistrationMatrices {
    pub image_to_image: HomogeneousTransform,
    pub world_to_world: HomogeneousTransform,
}

/// Pretty-print the matrices as JSON, creating parent directories.
pub fn write_coregistration_matrices(path: &Path, matrices: &CoregistrationMatrices) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(matrices).context("Failed to serialize matrices")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn read_coregistration_matrices(path: &Path) -> Result<CoregistrationMatrices> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}
