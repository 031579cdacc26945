use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use crate::transform::HomogeneousTransform;
use crate::volume::Volume;

/// Per-axis integer decimation factors, each at least 1.
pub type DownsampleFactors = [usize; 3];

/// Plan per-axis decimation factors towards a target isotropic spacing.
///
/// `factor[i] = max(1, round(target_spacing / spacing[i]))` where
/// `spacing[i]` is the norm of column `i` of the voxel-to-world matrix.
/// Axes are independent and keep the volume's native order.
pub fn plan_downsampling(
    voxel_to_world: &HomogeneousTransform,
    target_spacing: f64,
) -> DownsampleFactors {
    let spacing = voxel_to_world.voxel_spacing();
    let mut factors = [1usize; 3];
    for (axis, factor) in factors.iter_mut().enumerate() {
        *factor = factor_for_spacing(spacing[axis], target_spacing);
    }
    tracing::debug!(
        "spacing {:?} mm with target {} mm gives factors {:?}",
        spacing.to_array(),
        target_spacing,
        factors
    );
    factors
}

fn factor_for_spacing(spacing: f64, target_spacing: f64) -> usize {
    let ratio = (target_spacing / spacing).round();
    if ratio.is_finite() && ratio >= 1.0 {
        ratio as usize
    } else {
        1
    }
}

/// Reciprocal factors, used to bring mesh coordinates onto the decimated grid.
pub fn inverse_factors(factors: &DownsampleFactors) -> [f64; 3] {
    factors.map(|f| 1.0 / f as f64)
}

/// Factors as floating point scale values.
pub fn factors_as_scale(factors: &DownsampleFactors) -> [f64; 3] {
    factors.map(|f| f as f64)
}

/// Downsample filter.
///
/// Keeps every `factor`-th voxel along each axis starting at index 0, i.e.
/// `buffer[::fx, ::fy, ::fz]`. No smoothing is applied before decimation,
/// so high frequencies alias; downstream results depend on this exact
/// sampling. The voxel-to-world transform is copied unchanged: callers
/// compensate by scaling mesh coordinates with [`inverse_factors`].
pub struct DownsampleFilter<B: Backend> {
    factors: DownsampleFactors,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> DownsampleFilter<B> {
    /// Create a new downsample filter.
    ///
    /// # Arguments
    /// * `factors` - Decimation factor for each axis; zero is treated as 1.
    pub fn new(factors: DownsampleFactors) -> Self {
        Self {
            factors: factors.map(|f| f.max(1)),
            _b: std::marker::PhantomData,
        }
    }

    pub fn factors(&self) -> DownsampleFactors {
        self.factors
    }

    /// Output shape `ceil(shape / factors)`.
    pub fn output_shape(&self, shape: [usize; 3]) -> [usize; 3] {
        let mut out = shape;
        for (axis, size) in out.iter_mut().enumerate() {
            *size = size.div_ceil(self.factors[axis]);
        }
        out
    }

    /// Apply the filter to a volume.
    pub fn apply(&self, volume: &Volume<B>) -> Volume<B> {
        let mut data = volume.data().clone();
        let device = data.device();
        let dims = volume.shape();

        for (axis, &factor) in self.factors.iter().enumerate() {
            if factor <= 1 {
                continue;
            }
            let indices_vec: Vec<i32> = (0..dims[axis])
                .step_by(factor)
                .map(|x| x as i32)
                .collect();
            let indices = Tensor::<B, 1, Int>::from_ints(indices_vec.as_slice(), &device);
            data = data.select(axis, indices);
        }

        tracing::debug!(
            "downsampled {:?} -> {:?} with factors {:?}",
            dims,
            self.output_shape(dims),
            self.factors
        );

        Volume::new(data, *volume.voxel_to_world())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_plan_one_mm_isotropic() {
        let vtw = HomogeneousTransform::identity();
        assert_eq!(plan_downsampling(&vtw, 3.0), [3, 3, 3]);
    }

    #[test]
    fn test_plan_anisotropic_rounding() {
        // 3/0.9 = 3.33 -> 3, 3/0.75 = 4, 3/5 = 0.6 -> 1
        let vtw = HomogeneousTransform::scaling([0.9, 0.75, 5.0]);
        assert_eq!(plan_downsampling(&vtw, 3.0), [3, 4, 1]);
    }

    #[test]
    fn test_plan_uses_column_norms() {
        // Oblique columns with norm 1.5 each.
        let (s, c) = 30f64.to_radians().sin_cos();
        let vtw = HomogeneousTransform::from_rows([
            [1.5 * c, -1.5 * s, 0.0, 0.0],
            [1.5 * s, 1.5 * c, 0.0, 0.0],
            [0.0, 0.0, 1.5, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert_eq!(plan_downsampling(&vtw, 3.0), [2, 2, 2]);
    }

    #[test]
    fn test_inverse_factors() {
        assert_eq!(inverse_factors(&[2, 4, 1]), [0.5, 0.25, 1.0]);
        assert_eq!(factors_as_scale(&[2, 4, 1]), [2.0, 4.0, 1.0]);
    }

    #[test]
    fn test_output_shape_ceil() {
        let filter = DownsampleFilter::<Backend>::new([2, 3, 1]);
        assert_eq!(filter.output_shape([10, 10, 7]), [5, 4, 7]);
        assert_eq!(filter.output_shape([11, 9, 1]), [6, 3, 1]);
    }

    #[test]
    fn test_apply_keeps_transform() {
        let device = Default::default();
        let vtw = HomogeneousTransform::scaling([1.0, 1.0, 2.0]);
        let volume = Volume::<Backend>::from_values(vec![0.0; 5 * 4 * 3], [5, 4, 3], vtw, &device);
        let filter = DownsampleFilter::new([2, 2, 1]);
        let out = filter.apply(&volume);
        assert_eq!(out.shape(), [3, 2, 3]);
        assert_eq!(out.voxel_to_world(), &vtw);
    }

    #[test]
    fn test_zero_factor_clamped() {
        let filter = DownsampleFilter::<Backend>::new([0, 2, 1]);
        assert_eq!(filter.factors(), [1, 2, 1]);
    }
}
