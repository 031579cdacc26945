//! Voxel volume with its voxel-to-world transform.
//!
//! Buffers keep the native axis order of the file they came from, so the
//! columns of the voxel-to-world matrix line up with tensor dimensions
//! `0, 1, 2`.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::error::BufferError;
use crate::spatial::VoxelSpacing;
use crate::transform::HomogeneousTransform;

/// 3-D scalar volume.
///
/// # Coordinate Systems
/// * **Index Space**: voxel indices along tensor dimensions `[x, y, z]`
/// * **World Space**: scanner coordinates in mm, reached through
///   [`Volume::voxel_to_world`]
///
/// # Examples
/// ```rust
/// use atlasreg_core::{HomogeneousTransform, Volume};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
/// let volume = Volume::new(data, HomogeneousTransform::isotropic_scaling(2.0));
/// assert_eq!(volume.shape(), [10, 10, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Volume<B: Backend> {
    data: Tensor<B, 3>,
    voxel_to_world: HomogeneousTransform,
}

impl<B: Backend> Volume<B> {
    /// Create a volume from a buffer and its voxel-to-world transform.
    pub fn new(data: Tensor<B, 3>, voxel_to_world: HomogeneousTransform) -> Self {
        Self {
            data,
            voxel_to_world,
        }
    }

    /// Create a volume from row-major values (last axis fastest).
    pub fn from_values(
        values: Vec<f32>,
        shape: [usize; 3],
        voxel_to_world: HomogeneousTransform,
        device: &B::Device,
    ) -> Self {
        let data = Tensor::<B, 3>::from_data(TensorData::new(values, shape), device);
        Self::new(data, voxel_to_world)
    }

    /// The voxel buffer.
    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    /// Transform from voxel indices to world coordinates.
    pub fn voxel_to_world(&self) -> &HomogeneousTransform {
        &self.voxel_to_world
    }

    /// Buffer shape in native axis order.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }

    /// Voxel spacing derived from the voxel-to-world columns.
    pub fn spacing(&self) -> VoxelSpacing {
        self.voxel_to_world.voxel_spacing()
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Same voxels, different voxel-to-world transform.
    pub fn with_voxel_to_world(&self, voxel_to_world: HomogeneousTransform) -> Self {
        Self::new(self.data.clone(), voxel_to_world)
    }

    /// Copy the buffer out as row-major `f32` values.
    pub fn to_values(&self) -> Result<Vec<f32>, BufferError> {
        self.data
            .to_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| BufferError {
                what: "volume",
                message: format!("{:?}", e),
            })
    }
}
