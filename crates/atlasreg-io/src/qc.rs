//! Quality-control figure for a finished registration.
//!
//! The figure holds two collages side by side on a grey canvas: the
//! normalized image blended with colour-coded class priors, and a
//! checkerboard mosaic of the grey-matter prior against the masked image.

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use image::{Rgb, RgbImage};
use std::path::Path;

/// Layout and blending parameters of the QC figure.
#[derive(Debug, Clone, PartialEq)]
pub struct QcFigureConfig {
    /// Weight of the colour-coded priors in the overlay.
    pub prior_alpha: f32,
    /// Number of axial slices in each collage.
    pub slice_count: usize,
    /// Border around and between the collages, in pixels.
    pub border: usize,
    /// Canvas grey level in `[0, 1]`.
    pub background: f32,
    /// Zero-based class shown in the mosaic (grey matter).
    pub gm_class: usize,
    /// Checkerboard tile edge, in pixels.
    pub tile_size: usize,
}

impl Default for QcFigureConfig {
    fn default() -> Self {
        Self {
            prior_alpha: 0.4,
            slice_count: 10,
            border: 20,
            background: 0.5,
            gm_class: 2,
            tile_size: 2,
        }
    }
}

impl QcFigureConfig {
    pub fn with_slice_count(mut self, count: usize) -> Self {
        self.slice_count = count.max(1);
        self
    }

    pub fn with_border(mut self, border: usize) -> Self {
        self.border = border;
        self
    }

    fn collage_grid(&self) -> (usize, usize) {
        let rows = if self.slice_count > 1 { 2 } else { 1 };
        (rows, self.slice_count.div_ceil(rows))
    }
}

/// RGB volume in `[x, y, z]` order with channels in `[0, 1]`.
struct RgbVolume {
    dims: [usize; 3],
    voxels: Vec<[f32; 3]>,
}

impl RgbVolume {
    fn at(&self, x: usize, y: usize, z: usize) -> [f32; 3] {
        self.voxels[(x * self.dims[1] + y) * self.dims[2] + z]
    }
}

/// Hue wheel with one fully saturated colour per class.
fn class_colors(class_count: usize) -> Vec<[f32; 3]> {
    (0..class_count)
        .map(|c| hsv_to_rgb(c as f32 / class_count as f32))
        .collect()
}

fn hsv_to_rgb(hue: f32) -> [f32; 3] {
    let h = (hue.fract() * 6.0).max(0.0);
    let sector = h.floor() as u32;
    let f = h - h.floor();
    let (q, t) = (1.0 - f, f);
    match sector {
        0 => [1.0, t, 0.0],
        1 => [q, 1.0, 0.0],
        2 => [0.0, 1.0, t],
        3 => [0.0, q, 1.0],
        4 => [t, 0.0, 1.0],
        _ => [1.0, 0.0, q],
    }
}

fn normalize(values: &[f32]) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Pick `count` slice indices spread evenly over `0..len`.
fn slice_indices(len: usize, count: usize) -> Vec<usize> {
    (0..count)
        .map(|k| {
            let position = (k as f64 + 1.0) * len as f64 / (count as f64 + 1.0);
            (position.floor() as usize).min(len.saturating_sub(1))
        })
        .collect()
}

/// Tile axial slices into a grid; slice columns run along x, rows along y.
fn collage(volume: &RgbVolume, config: &QcFigureConfig) -> (usize, usize, Vec<[f32; 3]>) {
    let [nx, ny, nz] = volume.dims;
    let (grid_rows, grid_cols) = config.collage_grid();
    let width = grid_cols * nx;
    let height = grid_rows * ny;
    let mut pixels = vec![[config.background; 3]; width * height];

    for (k, z) in slice_indices(nz, config.slice_count).into_iter().enumerate() {
        let (tile_row, tile_col) = (k / grid_cols, k % grid_cols);
        for y in 0..ny {
            for x in 0..nx {
                let px = tile_col * nx + x;
                let py = tile_row * ny + (ny - 1 - y);
                pixels[py * width + px] = volume.at(x, y, z);
            }
        }
    }
    (width, height, pixels)
}

/// Build the QC figure from an image buffer and rasterized class priors.
///
/// `priors` is `[x, y, z, class]` with probabilities in `[0, 1]` and must
/// share the spatial shape of `image`.
pub fn compose_qc_figure<B: Backend>(
    image: &Tensor<B, 3>,
    priors: &Tensor<B, 4>,
    config: &QcFigureConfig,
) -> Result<RgbImage> {
    let dims = image.dims();
    let [px, py, pz, class_count] = priors.dims();
    if [px, py, pz] != dims {
        anyhow::bail!(
            "Prior shape {:?} does not match image shape {:?}",
            [px, py, pz],
            dims
        );
    }
    if dims.iter().any(|&d| d == 0) || class_count == 0 {
        anyhow::bail!("Cannot draw a QC figure for an empty volume {:?}", dims);
    }

    let image_values: Vec<f32> = image
        .to_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Failed to read image buffer: {:?}", e))?;
    let prior_values: Vec<f32> = priors
        .to_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Failed to read priors: {:?}", e))?;

    let colors = class_colors(class_count);
    let normalized = normalize(&image_values);
    let alpha = config.prior_alpha;
    let gm_class = config.gm_class;

    let mut overlay = Vec::with_capacity(normalized.len());
    let mut mosaic = Vec::with_capacity(normalized.len());
    for (i, &intensity) in normalized.iter().enumerate() {
        let voxel_priors = &prior_values[i * class_count..(i + 1) * class_count];

        let mut coded = [0.0f32; 3];
        for (p, color) in voxel_priors.iter().zip(&colors) {
            for channel in 0..3 {
                coded[channel] += p * color[channel];
            }
        }
        overlay.push(coded.map(|c| (1.0 - alpha) * intensity + alpha * c.min(1.0)));

        let mask = voxel_priors.iter().sum::<f32>() > 0.5;
        let masked = if mask { intensity } else { 0.0 };
        let gm = voxel_priors.get(gm_class).copied().unwrap_or(0.0);

        let z = i % dims[2];
        let y = (i / dims[2]) % dims[1];
        let x = i / (dims[1] * dims[2]);
        let tile = config.tile_size.max(1);
        let value = if ((x / tile) + (y / tile) + (z / tile)) % 2 == 0 {
            gm
        } else {
            masked
        };
        mosaic.push([value; 3]);
    }

    let overlay = RgbVolume { dims, voxels: overlay };
    let mosaic = RgbVolume { dims, voxels: mosaic };
    let (width, height, overlay_pixels) = collage(&overlay, config);
    let (_, _, mosaic_pixels) = collage(&mosaic, config);

    let border = config.border;
    let figure_width = 2 * width + 3 * border;
    let figure_height = height + 2 * border;
    let grey = quantize(config.background);
    let mut figure = RgbImage::from_pixel(figure_width as u32, figure_height as u32, Rgb([grey; 3]));

    for (offset, pixels) in [(border, &overlay_pixels), (2 * border + width, &mosaic_pixels)] {
        for row in 0..height {
            for col in 0..width {
                let rgb = pixels[row * width + col].map(quantize);
                figure.put_pixel((offset + col) as u32, (border + row) as u32, Rgb(rgb));
            }
        }
    }

    tracing::debug!(
        "composed {}x{} QC figure from {:?} volume with {} classes",
        figure_width,
        figure_height,
        dims,
        class_count
    );
    Ok(figure)
}

fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Save a QC figure as PNG, creating parent directories.
pub fn write_qc_figure(path: &Path, figure: &RgbImage) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    figure
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write QC figure {}", path.display()))?;
    tracing::info!("wrote QC figure {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn ramp_image(dims: [usize; 3]) -> Tensor<TestBackend, 3> {
        let n = dims.iter().product::<usize>();
        let values: Vec<f32> = (0..n).map(|i| i as f32).collect();
        Tensor::from_data(TensorData::new(values, dims), &Default::default())
    }

    fn uniform_priors(dims: [usize; 3], classes: usize) -> Tensor<TestBackend, 4> {
        let n = dims.iter().product::<usize>() * classes;
        let values = vec![1.0 / classes as f32; n];
        Tensor::from_data(
            TensorData::new(values, [dims[0], dims[1], dims[2], classes]),
            &Default::default(),
        )
    }

    #[test]
    fn test_figure_dimensions() -> Result<()> {
        let dims = [12, 9, 20];
        let config = QcFigureConfig::default();
        let figure = compose_qc_figure(&ramp_image(dims), &uniform_priors(dims, 4), &config)?;
        // Two rows of five slices per collage.
        assert_eq!(figure.width() as usize, 2 * 5 * 12 + 3 * 20);
        assert_eq!(figure.height() as usize, 2 * 9 + 2 * 20);
        assert_eq!(figure.get_pixel(0, 0), &Rgb([128, 128, 128]));
        Ok(())
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let image = ramp_image([4, 4, 4]);
        let priors = uniform_priors([4, 4, 3], 2);
        assert!(compose_qc_figure(&image, &priors, &QcFigureConfig::default()).is_err());
    }

    #[test]
    fn test_hue_wheel() {
        let colors = class_colors(3);
        let expected = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        for (color, want) in colors.iter().zip(expected) {
            for channel in 0..3 {
                assert!((color[channel] - want[channel]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_slice_indices_in_range() {
        let indices = slice_indices(20, 10);
        assert_eq!(indices.len(), 10);
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
        assert!(indices.iter().all(|&z| z < 20));
        assert_eq!(slice_indices(1, 10), vec![0; 10]);
    }

    #[test]
    fn test_write_png() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("template_coregistrationQcFigure.png");
        let dims = [6, 5, 4];
        let config = QcFigureConfig::default().with_border(2).with_slice_count(4);
        let figure = compose_qc_figure(&ramp_image(dims), &uniform_priors(dims, 3), &config)?;
        write_qc_figure(&path, &figure)?;

        let back = image::open(&path)?.to_rgb8();
        assert_eq!(back.dimensions(), figure.dimensions());
        Ok(())
    }
}
