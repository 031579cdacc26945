use anyhow::{Context, Result};
use atlasreg_core::{HomogeneousTransform, Volume};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// Read a 3-D NIfTI volume with its voxel-to-world transform.
///
/// The voxel-to-world matrix comes from the sform when present, then the
/// qform, then the voxel sizes alone. Voxels keep the file's `[x, y, z]`
/// axis order so that matrix columns match tensor dimensions.
pub fn read_volume<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Volume<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let voxel_to_world = header_voxel_to_world(obj.header());

    let ndarray_volume = obj
        .into_volume()
        .into_ndarray::<f32>()
        .with_context(|| format!("Failed to convert {} to ndarray", path.display()))?;

    let shape = ndarray_volume.shape().to_vec();
    let dims = match shape.as_slice() {
        [x, y, z] => [*x, *y, *z],
        // Trailing singleton dimensions (e.g. a single time point) are dropped.
        [x, y, z, rest @ ..] if rest.iter().all(|&d| d == 1) => [*x, *y, *z],
        _ => anyhow::bail!(
            "Expected 3D NIfTI file {}, found shape {:?}",
            path.display(),
            shape
        ),
    };

    // Logical iteration order is row-major regardless of memory layout.
    let values: Vec<f32> = ndarray_volume.iter().copied().collect();
    let data = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new(dims)), device);

    tracing::debug!(
        "read {} with shape {:?} and spacing {:?}",
        path.display(),
        dims,
        voxel_to_world.voxel_spacing().to_array()
    );

    Ok(Volume::new(data, voxel_to_world))
}

/// Voxel-to-world transform described by a NIfTI header.
pub fn header_voxel_to_world(header: &NiftiHeader) -> HomogeneousTransform {
    let rows = if header.sform_code > 0 {
        [
            header.srow_x,
            header.srow_y,
            header.srow_z,
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else if header.qform_code > 0 {
        let b = header.quatern_b;
        let c = header.quatern_c;
        let d = header.quatern_d;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();

        let qfac = if header.pixdim[0] == 0.0 { 1.0 } else { header.pixdim[0] };

        let r11 = a * a + b * b - c * c - d * d;
        let r12 = 2.0 * b * c - 2.0 * a * d;
        let r13 = 2.0 * b * d + 2.0 * a * c;

        let r21 = 2.0 * b * c + 2.0 * a * d;
        let r22 = a * a + c * c - b * b - d * d;
        let r23 = 2.0 * c * d - 2.0 * a * b;

        let r31 = 2.0 * b * d - 2.0 * a * c;
        let r32 = 2.0 * c * d + 2.0 * a * b;
        let r33 = a * a + d * d - c * c - b * b;

        let dx = header.pixdim[1];
        let dy = header.pixdim[2];
        let dz = header.pixdim[3] * qfac;

        [
            [r11 * dx, r12 * dy, r13 * dz, header.quatern_x],
            [r21 * dx, r22 * dy, r23 * dz, header.quatern_y],
            [r31 * dx, r32 * dy, r33 * dz, header.quatern_z],
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else {
        let spacing = |i: usize| if header.pixdim[i] > 0.0 { header.pixdim[i] } else { 1.0 };
        [
            [spacing(1), 0.0, 0.0, 0.0],
            [0.0, spacing(2), 0.0, 0.0],
            [0.0, 0.0, spacing(3), 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    };

    HomogeneousTransform::from_rows(rows.map(|row| row.map(f64::from)))
}

/// Write a volume to a NIfTI file, storing its voxel-to-world transform as
/// the sform. A `.nii.gz` path is written compressed.
pub fn write_volume<B: Backend, P: AsRef<Path>>(path: P, volume: &Volume<B>) -> Result<()> {
    use ndarray::Array3;
    use nifti::writer::WriterOptions;

    let path = path.as_ref();
    let [nx, ny, nz] = volume.shape();
    let values = volume
        .to_values()
        .with_context(|| format!("Failed to read voxels for {}", path.display()))?;
    let array = Array3::from_shape_vec((nx, ny, nz), values)
        .map_err(|e| anyhow::anyhow!("Failed to create ndarray: {}", e))?;

    let header = header_for(volume.voxel_to_world());

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .map_err(|e| anyhow::anyhow!("Failed to write NIfTI file {}: {}", path.display(), e))?;

    tracing::debug!("wrote {} with shape {:?}", path.display(), [nx, ny, nz]);
    Ok(())
}

fn header_for(voxel_to_world: &HomogeneousTransform) -> NiftiHeader {
    let rows = voxel_to_world.to_rows();
    let spacing = voxel_to_world.voxel_spacing();
    let row = |r: usize| rows[r].map(|v| v as f32);

    NiftiHeader {
        sform_code: 1,
        qform_code: 0,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        pixdim: [
            1.0,
            spacing[0] as f32,
            spacing[1] as f32,
            spacing[2] as f32,
            1.0,
            1.0,
            1.0,
            1.0,
        ],
        ..NiftiHeader::default()
    }
}
