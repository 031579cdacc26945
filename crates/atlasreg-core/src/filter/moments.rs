//! Intensity moments of voxel buffers.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Tensor};

/// Intensity-weighted centre of mass in voxel coordinates.
///
/// Returns `None` when the total mass is zero or not finite, in which case
/// the centre is undefined.
pub fn center_of_mass<B: Backend>(buffer: &Tensor<B, 3>) -> Option<[f64; 3]> {
    let [nx, ny, nz] = buffer.dims();
    let total = buffer.clone().sum().into_scalar().elem::<f64>();
    if total == 0.0 || !total.is_finite() {
        return None;
    }

    // Marginal profile along each axis.
    let profiles = [
        buffer.clone().sum_dim(2).sum_dim(1).reshape([nx]),
        buffer.clone().sum_dim(2).sum_dim(0).reshape([ny]),
        buffer.clone().sum_dim(1).sum_dim(0).reshape([nz]),
    ];

    let mut center = [0.0; 3];
    for (axis, profile) in profiles.into_iter().enumerate() {
        let len = profile.dims()[0];
        let coordinates = Tensor::<B, 1, Int>::arange(0..len as i64, &profile.device()).float();
        let moment = (profile * coordinates).sum().into_scalar().elem::<f64>();
        center[axis] = moment / total;
    }
    Some(center)
}

/// Sum the class channels `first_class..` of a `[x, y, z, class]` volume.
///
/// Returns `None` when there is no channel at or past `first_class`.
pub fn sum_classes_from<B: Backend>(priors: &Tensor<B, 4>, first_class: usize) -> Option<Tensor<B, 3>> {
    let [nx, ny, nz, classes] = priors.dims();
    if first_class >= classes {
        return None;
    }
    let summed = priors
        .clone()
        .slice([0..nx, 0..ny, 0..nz, first_class..classes])
        .sum_dim(3)
        .reshape([nx, ny, nz]);
    Some(summed)
}
