pub mod nifti_io;
pub mod matrices;
pub mod lta;
pub mod qc;

pub use nifti_io::{read_volume, write_volume};
pub use matrices::{read_coregistration_matrices, write_coregistration_matrices, CoregistrationMatrices};
pub use lta::{read_lta_matrix, write_lta, LinearTransformArray, VolumeGeometry};
pub use qc::{compose_qc_figure, write_qc_figure, QcFigureConfig};
