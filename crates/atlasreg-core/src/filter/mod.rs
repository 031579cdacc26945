//! Resolution planning, decimation and moments.

pub mod downsample;
pub mod moments;

pub use downsample::{
    factors_as_scale, inverse_factors, plan_downsampling, DownsampleFactors, DownsampleFilter,
};
pub use moments::{center_of_mass, sum_classes_from};
