//! Optimization loop control.

use atlasreg_core::filter::{factors_as_scale, DownsampleFactors};
use atlasreg_core::spatial::scale_points;
use atlasreg_core::transform::{affine_from_point_correspondences, select_points};
use atlasreg_core::PointSet;
use burn::tensor::backend::Backend;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use crate::engine::{AtlasMesh, MeshOptimizer};
use crate::error::{RegistrationError, Result};
use crate::progress::{StepObserver, StepRecord};

/// Loop state of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Running,
    /// The optimizer reported a step without any deformation.
    Converged,
}

/// Summary of a finished optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationReport {
    /// Number of optimizer steps, including the final one that did not move
    /// any node.
    pub iterations: usize,
    pub final_cost: f64,
    /// Node positions minus the rest positions captured after mesh
    /// construction.
    pub displacement: PointSet,
}

/// Per-iteration logging of the affine implied by the current mesh.
#[derive(Debug, Clone)]
struct ScalingDiagnostics {
    indices: [usize; 4],
    scale: [f64; 3],
    reference: PointSet,
}

impl ScalingDiagnostics {
    fn log<B: Backend, M: AtlasMesh<B>>(&self, mesh: &M, iteration: usize) {
        let current = scale_points(&select_points(&mesh.positions(), &self.indices), &self.scale);
        match affine_from_point_correspondences(&self.reference, &current) {
            Ok(affine) => {
                let s = affine.axis_scalings();
                tracing::info!(
                    "iteration {}: axis scalings {:.4} {:.4} {:.4}",
                    iteration,
                    s[0],
                    s[1],
                    s[2]
                );
            }
            Err(e) => tracing::warn!("iteration {}: no implied affine ({})", iteration, e),
        }
    }
}

/// Steps the optimizer until it stops deforming the mesh.
///
/// There is no iteration cap: the loop ends only when a step reports a
/// maximal deformation of exactly zero, or when the optimizer fails.
pub struct OptimizationDriver<B: Backend> {
    state: DriverState,
    iterations: usize,
    last_cost: Option<f64>,
    started: Option<Instant>,
    observer: Option<Arc<dyn StepObserver>>,
    diagnostics: Option<ScalingDiagnostics>,
    _b: PhantomData<B>,
}

impl<B: Backend> Default for OptimizationDriver<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> OptimizationDriver<B> {
    pub fn new() -> Self {
        Self {
            state: DriverState::Running,
            iterations: 0,
            last_cost: None,
            started: None,
            observer: None,
            diagnostics: None,
            _b: PhantomData,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Log the axis scalings of the implied affine after every step.
    ///
    /// `reference_positions` are the node positions the affine is measured
    /// from; they are scaled up by `factors` like the current positions.
    pub fn with_scaling_diagnostics(
        mut self,
        reference_positions: &PointSet,
        indices: [usize; 4],
        factors: &DownsampleFactors,
    ) -> Result<Self> {
        check_indices(&indices, reference_positions.nrows())?;
        let scale = factors_as_scale(factors);
        self.diagnostics = Some(ScalingDiagnostics {
            indices,
            scale,
            reference: scale_points(&select_points(reference_positions, &indices), &scale),
        });
        Ok(self)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Take one optimizer step. Does nothing once converged.
    pub fn step<M, O>(&mut self, mesh: &mut M, optimizer: &mut O) -> Result<DriverState>
    where
        M: AtlasMesh<B>,
        O: MeshOptimizer<M>,
    {
        if self.state == DriverState::Converged {
            return Ok(self.state);
        }

        let started = *self.started.get_or_insert_with(Instant::now);
        let step = optimizer.step(mesh)?;
        self.iterations += 1;
        self.last_cost = Some(step.cost);

        tracing::info!(
            "iteration {}: maximal deformation {}, cost {}",
            self.iterations,
            step.maximal_deformation,
            step.cost
        );

        let record = StepRecord {
            iteration: self.iterations,
            cost: step.cost,
            maximal_deformation: step.maximal_deformation,
            elapsed: started.elapsed(),
        };
        if let Some(observer) = &self.observer {
            observer.on_step(&record);
        }
        if let Some(diagnostics) = &self.diagnostics {
            diagnostics.log(mesh, self.iterations);
        }

        if step.maximal_deformation == 0.0 {
            self.state = DriverState::Converged;
            if let Some(observer) = &self.observer {
                observer.on_converged(&record);
            }
        }
        Ok(self.state)
    }

    /// Run until convergence and report displacement from `rest_positions`.
    pub fn run<M, O>(
        &mut self,
        mesh: &mut M,
        optimizer: &mut O,
        rest_positions: &PointSet,
    ) -> Result<OptimizationReport>
    where
        M: AtlasMesh<B>,
        O: MeshOptimizer<M>,
    {
        while self.step(mesh, optimizer)? == DriverState::Running {}

        let positions = mesh.positions();
        if positions.shape() != rest_positions.shape() {
            return Err(RegistrationError::ShapeMismatch {
                expected: vec![rest_positions.nrows(), 3],
                actual: vec![positions.nrows(), 3],
            });
        }

        tracing::info!(
            "optimization finished after {} iterations in {:.2}s",
            self.iterations,
            self.started.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
        );

        Ok(OptimizationReport {
            iterations: self.iterations,
            final_cost: self.last_cost.unwrap_or(f64::NAN),
            displacement: positions - rest_positions,
        })
    }
}

/// Every index must address an existing node.
pub(crate) fn check_indices(indices: &[usize; 4], node_count: usize) -> Result<()> {
    match indices.iter().find(|&&i| i >= node_count) {
        Some(index) => Err(RegistrationError::invalid_configuration(format!(
            "sample node index {} out of range for a mesh with {} nodes",
            index, node_count
        ))),
        None => Ok(()),
    }
}
