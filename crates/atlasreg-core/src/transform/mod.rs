//! Homogeneous transforms and the algebra that moves them between
//! coordinate spaces.
//!
//! Four spaces meet in atlas registration: world (scanner) coordinates of
//! subject and template, the template voxel grid, the subject voxel grid and
//! the decimated subject grid. Every transform here is a 4×4 homogeneous
//! matrix with the translation in the rightmost column.

pub mod homogeneous;
pub mod algebra;

pub use homogeneous::HomogeneousTransform;
pub use algebra::{
    affine_from_point_correspondences, image_to_image_transform, offset_between, select_points,
    world_to_world_transform, CORRESPONDENCE_POINTS,
};
