//! Affine registration of a deformable probabilistic atlas to a subject.
//!
//! The mesh engine, cost evaluator and optimizer are injected through the
//! traits in [`engine`]; this crate drives them and turns the deformed mesh
//! back into an affine transform.

pub mod error;
pub mod config;
pub mod engine;
pub mod progress;
pub mod pose;
pub mod coarse;
pub mod driver;
pub mod compose;
pub mod pipeline;
pub mod recipe;

pub use error::{RegistrationError, Result};
pub use config::{AtlasRegistrationConfig, InitialPoseConfig, OptimizerSettings};
pub use engine::{AtlasEngine, AtlasMesh, CostAndGradient, CostEvaluator, MeshOptimizer, OptimizerStep};
pub use progress::{HistoryObserver, LoggingObserver, StepObserver, StepRecord};
pub use pose::{InitialPose, InitialPoseBuilder};
pub use coarse::{CoarseAligner, CoarseOutcome};
pub use driver::{DriverState, OptimizationDriver, OptimizationReport};
pub use compose::{RegistrationResult, ResultComposer};
pub use pipeline::{AtlasRegistration, RegistrationOutcome};
pub use recipe::{register_atlas, RegistrationOutputs, RegistrationRecipe};
