//! Scripted mesh engine for integration tests.
#![allow(dead_code)]

use atlasreg_core::spatial::{point_set_from_points, scale_points};
use atlasreg_core::{HomogeneousTransform, PointSet, Volume};
use atlasreg_registration::{
    AtlasEngine, AtlasMesh, CostAndGradient, CostEvaluator, MeshOptimizer, OptimizerSettings,
    OptimizerStep, Result,
};
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use nalgebra::Vector3;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type TestBackend = NdArray<f32>;

/// Mesh whose priors are a single foreground voxel at the node centroid.
#[derive(Debug, Clone)]
pub struct StubMesh {
    pub positions: PointSet,
    pub class_count: usize,
}

impl StubMesh {
    pub fn centroid(&self) -> Vector3<f64> {
        let n = self.positions.nrows() as f64;
        Vector3::from_fn(|axis, _| self.positions.column(axis).sum() / n)
    }
}

impl AtlasMesh<TestBackend> for StubMesh {
    fn node_count(&self) -> usize {
        self.positions.nrows()
    }

    fn class_count(&self) -> usize {
        self.class_count
    }

    fn positions(&self) -> PointSet {
        self.positions.clone()
    }

    fn set_positions(&mut self, positions: &PointSet) -> Result<()> {
        if positions.nrows() != self.positions.nrows() {
            return Err(atlasreg_registration::RegistrationError::mesh("node count changed"));
        }
        self.positions = positions.clone();
        Ok(())
    }

    fn scale(&mut self, factors: [f64; 3]) -> Result<()> {
        self.positions = scale_points(&self.positions, &factors);
        Ok(())
    }

    fn rasterize(
        &self,
        shape: [usize; 3],
        device: &<TestBackend as burn::tensor::backend::Backend>::Device,
    ) -> Result<Tensor<TestBackend, 4>> {
        let classes = self.class_count;
        let voxels = shape.iter().product::<usize>();
        let mut values = vec![0.0f32; voxels * classes];
        for voxel in 0..voxels {
            values[voxel * classes] = 1.0;
        }

        let centroid = self.centroid();
        let index: Vec<usize> = (0..3)
            .map(|axis| (centroid[axis].round().max(0.0) as usize).min(shape[axis] - 1))
            .collect();
        let voxel = (index[0] * shape[1] + index[1]) * shape[2] + index[2];
        values[voxel * classes] = 0.0;
        values[voxel * classes + classes - 1] = 1.0;

        Ok(Tensor::from_data(
            TensorData::new(values, [shape[0], shape[1], shape[2], classes]),
            device,
        ))
    }
}

/// Squared distance of every node from a target captured on first use.
#[derive(Debug, Clone)]
pub struct StubEvaluator {
    pub target_offset: Vector3<f64>,
    pub target: Option<PointSet>,
    pub evaluations: Arc<Mutex<usize>>,
}

impl StubEvaluator {
    pub fn new(target_offset: Vector3<f64>) -> Self {
        Self {
            target_offset,
            target: None,
            evaluations: Arc::new(Mutex::new(0)),
        }
    }

    fn target_for(&mut self, mesh: &StubMesh) -> PointSet {
        let offset = self.target_offset;
        self.target
            .get_or_insert_with(|| atlasreg_core::spatial::translate_points(&mesh.positions, &offset))
            .clone()
    }
}

impl CostEvaluator<StubMesh> for StubEvaluator {
    fn evaluate(&mut self, mesh: &StubMesh) -> Result<CostAndGradient> {
        *self.evaluations.lock().unwrap() += 1;
        let target = self.target_for(mesh);
        let difference = &mesh.positions - &target;
        Ok(CostAndGradient {
            cost: difference.norm_squared(),
            gradient: difference * 2.0,
        })
    }
}

/// Replays scripted deformations. The first step optionally applies a fixed
/// affine to every node.
#[derive(Debug, Clone)]
pub struct StubOptimizer {
    pub evaluator: StubEvaluator,
    pub deformations: Vec<f64>,
    pub first_step_transform: Option<HomogeneousTransform>,
    pub steps: usize,
    pub settings: OptimizerSettings,
}

impl MeshOptimizer<StubMesh> for StubOptimizer {
    fn step(&mut self, mesh: &mut StubMesh) -> Result<OptimizerStep> {
        if self.steps == 0 {
            if let Some(transform) = &self.first_step_transform {
                mesh.positions = transform.transform_points(&mesh.positions);
            }
        }
        let maximal_deformation = self.deformations.get(self.steps).copied().unwrap_or(0.0);
        self.steps += 1;
        let cost = self.evaluator.evaluate(mesh)?.cost;
        Ok(OptimizerStep {
            cost,
            maximal_deformation,
        })
    }
}

/// Records how meshes were loaded and which settings were forwarded.
#[derive(Debug, Clone, Default)]
pub struct EngineLog {
    pub initial_transform: Option<HomogeneousTransform>,
    pub stiffness: Option<f64>,
    pub settings: Option<OptimizerSettings>,
}

#[derive(Debug, Clone)]
pub struct StubEngine {
    /// Node positions in template voxel coordinates.
    pub nodes: PointSet,
    pub class_count: usize,
    pub target_offset: Vector3<f64>,
    pub deformations: Vec<f64>,
    pub first_step_transform: Option<HomogeneousTransform>,
    pub log: Arc<Mutex<EngineLog>>,
}

impl StubEngine {
    /// Cube corners around (5, 5, 5) plus the centre; three classes.
    pub fn cube() -> Self {
        let mut points = Vec::new();
        for &x in &[2.0, 8.0] {
            for &y in &[2.0, 8.0] {
                for &z in &[2.0, 8.0] {
                    points.push([x, y, z]);
                }
            }
        }
        points.push([5.0, 5.0, 5.0]);
        Self {
            nodes: point_set_from_points(&points),
            class_count: 3,
            target_offset: Vector3::zeros(),
            deformations: vec![0.0],
            first_step_transform: None,
            log: Arc::new(Mutex::new(EngineLog::default())),
        }
    }

    pub fn with_target_offset(mut self, offset: Vector3<f64>) -> Self {
        self.target_offset = offset;
        self
    }

    pub fn with_deformations(mut self, deformations: Vec<f64>) -> Self {
        self.deformations = deformations;
        self
    }

    pub fn with_first_step_transform(mut self, transform: HomogeneousTransform) -> Self {
        self.first_step_transform = Some(transform);
        self
    }

    pub fn mesh(&self, initial_transform: &HomogeneousTransform) -> StubMesh {
        StubMesh {
            positions: initial_transform.transform_points(&self.nodes),
            class_count: self.class_count,
        }
    }
}

impl AtlasEngine<TestBackend> for StubEngine {
    type Mesh = StubMesh;
    type Evaluator = StubEvaluator;
    type Optimizer = StubOptimizer;

    fn load_mesh_collection(
        &self,
        _path: &Path,
        initial_transform: &HomogeneousTransform,
        stiffness: f64,
    ) -> Result<StubMesh> {
        let mut log = self.log.lock().unwrap();
        log.initial_transform = Some(*initial_transform);
        log.stiffness = Some(stiffness);
        Ok(self.mesh(initial_transform))
    }

    fn cost_evaluator(&self, _image: &Volume<TestBackend>) -> Result<StubEvaluator> {
        Ok(StubEvaluator::new(self.target_offset))
    }

    fn optimizer(
        &self,
        evaluator: StubEvaluator,
        settings: &OptimizerSettings,
    ) -> Result<StubOptimizer> {
        self.log.lock().unwrap().settings = Some(*settings);
        Ok(StubOptimizer {
            evaluator,
            deformations: self.deformations.clone(),
            first_step_transform: self.first_step_transform,
            steps: 0,
            settings: *settings,
        })
    }
}

/// 10×10×10 volume of 3 mm voxels with one bright voxel.
pub fn bright_voxel_volume(at: [usize; 3]) -> Volume<TestBackend> {
    let shape = [10, 10, 10];
    let mut values = vec![0.0f32; 1000];
    values[(at[0] * shape[1] + at[1]) * shape[2] + at[2]] = 100.0;
    Volume::from_values(
        values,
        shape,
        HomogeneousTransform::isotropic_scaling(3.0),
        &Default::default(),
    )
}
