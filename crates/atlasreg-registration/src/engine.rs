//! Capabilities consumed from the deformable mesh engine.
//!
//! The engine owns the mesh data structure, the registration cost and the
//! optimizer update rule. Registration only moves node positions around and
//! reads back what the engine reports.

use atlasreg_core::{HomogeneousTransform, PointSet, Volume};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::path::Path;

use crate::config::OptimizerSettings;
use crate::error::Result;

/// A deformable tetrahedral atlas mesh.
pub trait AtlasMesh<B: Backend> {
    fn node_count(&self) -> usize;

    /// Number of label classes carried by each node.
    fn class_count(&self) -> usize;

    /// Current node positions, one row per node, in voxel coordinates.
    fn positions(&self) -> PointSet;

    /// Replace every node position; the row count must equal `node_count`.
    fn set_positions(&mut self, positions: &PointSet) -> Result<()>;

    /// Multiply node coordinates per axis.
    fn scale(&mut self, factors: [f64; 3]) -> Result<()>;

    /// Rasterize class priors onto a grid, giving `[x, y, z, class]`
    /// probabilities in `[0, 1]`.
    fn rasterize(&self, shape: [usize; 3], device: &B::Device) -> Result<Tensor<B, 4>>;
}

/// Cost and per-node gradient of the mesh against an image.
#[derive(Debug, Clone, PartialEq)]
pub struct CostAndGradient {
    pub cost: f64,
    pub gradient: PointSet,
}

pub trait CostEvaluator<M> {
    fn evaluate(&mut self, mesh: &M) -> Result<CostAndGradient>;
}

/// Outcome of a single optimizer step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerStep {
    pub cost: f64,
    /// Largest node displacement of the step, in voxels. Exactly zero once
    /// the optimizer has stopped moving nodes.
    pub maximal_deformation: f64,
}

pub trait MeshOptimizer<M> {
    /// Update node positions in place.
    fn step(&mut self, mesh: &mut M) -> Result<OptimizerStep>;
}

/// Factory for meshes, evaluators and optimizers.
pub trait AtlasEngine<B: Backend> {
    type Mesh: AtlasMesh<B>;
    type Evaluator: CostEvaluator<Self::Mesh>;
    type Optimizer: MeshOptimizer<Self::Mesh>;

    /// Load the reference mesh of a collection, placed by `initial_transform`
    /// (template voxels to subject voxels), with the given stiffness.
    fn load_mesh_collection(
        &self,
        path: &Path,
        initial_transform: &HomogeneousTransform,
        stiffness: f64,
    ) -> Result<Self::Mesh>;

    fn cost_evaluator(&self, image: &Volume<B>) -> Result<Self::Evaluator>;

    /// Build an optimizer that takes ownership of the evaluator.
    fn optimizer(
        &self,
        evaluator: Self::Evaluator,
        settings: &OptimizerSettings,
    ) -> Result<Self::Optimizer>;
}
