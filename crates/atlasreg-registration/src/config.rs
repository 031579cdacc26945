//! Tuning constants for atlas registration.

use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};

/// Rotation and scaling of the initial world-to-world guess.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialPoseConfig {
    /// Rotation about the x axis, in degrees.
    pub rotation_degrees: f64,
    /// Isotropic scaling applied after the rotation.
    pub scaling: f64,
}

impl Default for InitialPoseConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 10.0,
            scaling: 0.9,
        }
    }
}

impl InitialPoseConfig {
    /// No rotation, no scaling.
    pub fn identity() -> Self {
        Self {
            rotation_degrees: 0.0,
            scaling: 1.0,
        }
    }
}

/// Settings forwarded verbatim to the mesh optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Stop when no node moves further than this, in voxels.
    pub maximal_deformation_stop_criterion: f64,
    /// Line-search stop criterion on the deformation interval.
    pub line_search_maximal_deformation_interval_stop_criterion: f64,
    /// Number of updates kept by the limited-memory BFGS.
    pub bfgs_maximum_memory_length: usize,
    /// Optimizer-side progress output. Forced on by visualize.
    pub verbose: bool,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self::with_stop_criterion(0.005)
    }
}

impl OptimizerSettings {
    /// Use the same value for both deformation stop criteria.
    pub fn with_stop_criterion(criterion: f64) -> Self {
        Self {
            maximal_deformation_stop_criterion: criterion,
            line_search_maximal_deformation_interval_stop_criterion: criterion,
            bfgs_maximum_memory_length: 12,
            verbose: false,
        }
    }
}

/// Immutable configuration of a registration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasRegistrationConfig {
    /// Mesh stiffness before compensation for scaling and downsampling.
    pub mesh_stiffness: f64,
    /// Target isotropic voxel spacing of the decimated volume, in mm.
    pub target_spacing: f64,
    pub initial_pose: InitialPoseConfig,
    pub optimizer: OptimizerSettings,
    /// Zero-based mesh nodes used to recover the final affine. They must not
    /// be coplanar in the mesh.
    pub sample_node_indices: [usize; 4],
    /// Classes from this index on count as foreground when locating the
    /// atlas centre of mass.
    pub first_foreground_class: usize,
}

impl Default for AtlasRegistrationConfig {
    fn default() -> Self {
        Self {
            mesh_stiffness: 1e-7,
            target_spacing: 3.0,
            initial_pose: InitialPoseConfig::default(),
            optimizer: OptimizerSettings::default(),
            sample_node_indices: [0, 110, 201, 302],
            first_foreground_class: 2,
        }
    }
}

impl AtlasRegistrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mesh_stiffness(mut self, stiffness: f64) -> Self {
        self.mesh_stiffness = stiffness;
        self
    }

    pub fn with_target_spacing(mut self, spacing: f64) -> Self {
        self.target_spacing = spacing;
        self
    }

    pub fn with_initial_pose(mut self, pose: InitialPoseConfig) -> Self {
        self.initial_pose = pose;
        self
    }

    pub fn with_optimizer(mut self, settings: OptimizerSettings) -> Self {
        self.optimizer = settings;
        self
    }

    pub fn with_sample_node_indices(mut self, indices: [usize; 4]) -> Self {
        self.sample_node_indices = indices;
        self
    }

    pub fn with_first_foreground_class(mut self, class: usize) -> Self {
        self.first_foreground_class = class;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        positive("mesh_stiffness", self.mesh_stiffness)?;
        positive("target_spacing", self.target_spacing)?;
        positive("initial_pose.scaling", self.initial_pose.scaling)?;
        if !self.initial_pose.rotation_degrees.is_finite() {
            return Err(RegistrationError::invalid_configuration(
                "initial_pose.rotation_degrees must be finite",
            ));
        }

        let optimizer = &self.optimizer;
        non_negative(
            "optimizer.maximal_deformation_stop_criterion",
            optimizer.maximal_deformation_stop_criterion,
        )?;
        non_negative(
            "optimizer.line_search_maximal_deformation_interval_stop_criterion",
            optimizer.line_search_maximal_deformation_interval_stop_criterion,
        )?;
        if optimizer.bfgs_maximum_memory_length == 0 {
            return Err(RegistrationError::invalid_configuration(
                "optimizer.bfgs_maximum_memory_length must be at least 1",
            ));
        }

        let indices = &self.sample_node_indices;
        for (i, a) in indices.iter().enumerate() {
            if indices[i + 1..].contains(a) {
                return Err(RegistrationError::invalid_configuration(format!(
                    "sample_node_indices must be distinct, got {:?}",
                    indices
                )));
            }
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RegistrationError::invalid_configuration(format!(
            "{} must be positive and finite, got {}",
            name, value
        )))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RegistrationError::invalid_configuration(format!(
            "{} must be non-negative and finite, got {}",
            name, value
        )))
    }
}
