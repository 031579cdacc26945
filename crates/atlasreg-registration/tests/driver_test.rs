mod common;

use atlasreg_core::HomogeneousTransform;
use atlasreg_registration::{
    DriverState, HistoryObserver, MeshOptimizer, OptimizationDriver, OptimizerStep,
    RegistrationError, StepObserver, StepRecord,
};
use common::{StubEngine, StubEvaluator, StubMesh, StubOptimizer, TestBackend};
use nalgebra::Vector3;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

fn optimizer(deformations: Vec<f64>) -> StubOptimizer {
    StubOptimizer {
        evaluator: StubEvaluator::new(Vector3::zeros()),
        deformations,
        first_step_transform: None,
        steps: 0,
        settings: Default::default(),
    }
}

fn mesh() -> StubMesh {
    StubEngine::cube().mesh(&HomogeneousTransform::identity())
}

#[test]
fn test_scripted_deformations_stop_at_zero() {
    let mut mesh = mesh();
    let rest = mesh.positions.clone();
    let mut optimizer = optimizer(vec![5.0, 3.0, 1.0, 0.0]);
    let history = HistoryObserver::new();

    let mut driver = OptimizationDriver::<TestBackend>::new().with_observer(Arc::new(history.clone()));
    assert_eq!(driver.state(), DriverState::Running);
    let report = driver.run(&mut mesh, &mut optimizer, &rest).unwrap();

    assert_eq!(report.iterations, 4);
    assert_eq!(driver.state(), DriverState::Converged);
    assert_eq!(optimizer.steps, 4);
    assert_eq!(report.final_cost, 0.0);
    assert!(report.displacement.iter().all(|&d| d == 0.0));

    let records = history.history();
    let deformations: Vec<f64> = records.iter().map(|r| r.maximal_deformation).collect();
    assert_eq!(deformations, vec![5.0, 3.0, 1.0, 0.0]);
    assert_eq!(records.last().map(|r| r.iteration), Some(4));
}

#[test]
fn test_small_deformation_is_not_convergence() {
    let mut mesh = mesh();
    let rest = mesh.positions.clone();
    let mut optimizer = optimizer(vec![1e-12, f64::MIN_POSITIVE, 0.0]);
    let report = OptimizationDriver::<TestBackend>::new()
        .run(&mut mesh, &mut optimizer, &rest)
        .unwrap();
    assert_eq!(report.iterations, 3);
}

#[test]
fn test_step_after_convergence_is_noop() {
    let mut mesh = mesh();
    let mut optimizer = optimizer(vec![0.0]);
    let mut driver = OptimizationDriver::<TestBackend>::new();

    assert_eq!(driver.step(&mut mesh, &mut optimizer).unwrap(), DriverState::Converged);
    assert_eq!(driver.step(&mut mesh, &mut optimizer).unwrap(), DriverState::Converged);
    assert_eq!(driver.iterations(), 1);
    assert_eq!(optimizer.steps, 1);
}

#[test]
fn test_displacement_relative_to_rest() {
    let mut mesh = mesh();
    let rest = mesh.positions.clone();
    let shift = HomogeneousTransform::translation_transform(Vector3::new(0.5, 0.0, -1.0));
    let mut optimizer = optimizer(vec![1.0, 0.0]);
    optimizer.first_step_transform = Some(shift);

    let report = OptimizationDriver::<TestBackend>::new()
        .with_scaling_diagnostics(&rest, [0, 1, 2, 4], &[1, 1, 1])
        .unwrap()
        .run(&mut mesh, &mut optimizer, &rest)
        .unwrap();

    assert_eq!(report.iterations, 2);
    for row in report.displacement.row_iter() {
        assert!((row[0] - 0.5).abs() < 1e-12);
        assert!(row[1].abs() < 1e-12);
        assert!((row[2] + 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_diagnostics_reject_out_of_range_indices() {
    let rest = mesh().positions;
    let result = OptimizationDriver::<TestBackend>::new().with_scaling_diagnostics(
        &rest,
        [0, 110, 201, 302],
        &[1, 1, 1],
    );
    assert!(matches!(result, Err(RegistrationError::InvalidConfiguration(_))));
}

struct FailingOptimizer {
    after: usize,
    steps: usize,
}

impl MeshOptimizer<StubMesh> for FailingOptimizer {
    fn step(&mut self, _mesh: &mut StubMesh) -> atlasreg_registration::Result<OptimizerStep> {
        self.steps += 1;
        if self.steps > self.after {
            return Err(RegistrationError::optimizer("line search failed"));
        }
        Ok(OptimizerStep {
            cost: 1.0,
            maximal_deformation: 1.0,
        })
    }
}

#[test]
fn test_optimizer_error_propagates() {
    let mut mesh = mesh();
    let rest = mesh.positions.clone();
    let mut optimizer = FailingOptimizer { after: 2, steps: 0 };
    let mut driver = OptimizationDriver::<TestBackend>::new();

    let err = driver.run(&mut mesh, &mut optimizer, &rest).unwrap_err();
    assert!(matches!(err, RegistrationError::Optimizer(_)));
    assert_eq!(driver.iterations(), 2);
    assert_eq!(driver.state(), DriverState::Running);
}

#[derive(Default)]
struct ConvergenceCounter {
    converged: Mutex<Vec<usize>>,
}

impl StepObserver for ConvergenceCounter {
    fn on_step(&self, _record: &StepRecord) {}

    fn on_converged(&self, record: &StepRecord) {
        self.converged.lock().unwrap().push(record.iteration);
    }
}

#[test]
fn test_observer_sees_convergence_once() {
    let mut mesh = mesh();
    let rest = mesh.positions.clone();
    let counter = Arc::new(ConvergenceCounter::default());
    let mut optimizer = optimizer(vec![2.0, 0.0]);

    OptimizationDriver::<TestBackend>::new()
        .with_observer(counter.clone())
        .run(&mut mesh, &mut optimizer, &rest)
        .unwrap();
    assert_eq!(*counter.converged.lock().unwrap(), vec![2]);
}

proptest! {
    #[test]
    fn prop_iterations_count_steps(deformations in prop::collection::vec(1e-9f64..10.0, 0..20)) {
        let mut script = deformations.clone();
        script.push(0.0);

        let mut mesh = mesh();
        let rest = mesh.positions.clone();
        let mut optimizer = optimizer(script);
        let report = OptimizationDriver::<TestBackend>::new()
            .run(&mut mesh, &mut optimizer, &rest)
            .unwrap();
        prop_assert_eq!(report.iterations, deformations.len() + 1);
    }
}
