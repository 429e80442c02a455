//! Separable Gaussian smoothing with explicit boundary handling.
//!
//! Used for the per-lead denoising blur and as the anti-alias prefilter before any
//! downscaling resize.

use kornia::image::ImageError;

use super::{GrayRaster, raster_from_vec, raster_shape};

/// Kernel half-width in standard deviations.
const TRUNCATE: f64 = 4.0;

/// How samples outside the signal are synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMode {
    /// Repeat the edge sample: `a a | a b c`.
    Nearest,
    /// Reflect about the edge sample: `c b | a b c`.
    Mirror,
}

/// Normalized 1D Gaussian kernel of radius `trunc(4 * sigma + 0.5)`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i as f64 / sigma).powi(2)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    for w in kernel.iter_mut() {
        *w /= sum;
    }
    kernel
}

/// Smoothing sigma applied before shrinking an axis from `input_len` to `output_len`.
pub fn anti_alias_sigma(input_len: usize, output_len: usize) -> f64 {
    if output_len == 0 {
        return 0.0;
    }
    let scale = input_len as f64 / output_len as f64;
    ((scale - 1.0) / 2.0).max(0.0)
}

pub(crate) fn source_index(i: isize, len: usize, mode: BoundaryMode) -> usize {
    let n = len as isize;
    if (0..n).contains(&i) {
        return i as usize;
    }
    match mode {
        BoundaryMode::Nearest => i.clamp(0, n - 1) as usize,
        BoundaryMode::Mirror => {
            if n == 1 {
                return 0;
            }
            let period = 2 * (n - 1);
            let j = i.rem_euclid(period);
            (if j >= n { period - j } else { j }) as usize
        }
    }
}

pub fn convolve_1d(input: &[f64], kernel: &[f64], mode: BoundaryMode) -> Vec<f64> {
    if input.is_empty() {
        return Vec::new();
    }
    let radius = (kernel.len() / 2) as isize;
    (0..input.len() as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * input[source_index(i + k as isize - radius, input.len(), mode)])
                .sum()
        })
        .collect()
}

/// Gaussian blur with independent sigmas along rows (vertical) and columns (horizontal).
/// A zero sigma leaves that axis untouched.
pub fn gaussian_blur(
    src: &GrayRaster,
    sigma_rows: f64,
    sigma_cols: f64,
    mode: BoundaryMode,
) -> Result<GrayRaster, ImageError> {
    let (height, width) = raster_shape(src);
    let blurred = gaussian_blur_pixels(src.as_slice(), height, width, sigma_rows, sigma_cols, mode);
    raster_from_vec(height, width, blurred)
}

/// [`gaussian_blur`] over a row-major `height x width` buffer.
pub fn gaussian_blur_pixels(
    pixels: &[f32],
    height: usize,
    width: usize,
    sigma_rows: f64,
    sigma_cols: f64,
    mode: BoundaryMode,
) -> Vec<f32> {
    if width == 0 || height == 0 {
        return pixels.to_vec();
    }
    let mut buf: Vec<f64> = pixels.iter().map(|&v| v as f64).collect();

    if sigma_cols > 0.0 {
        let kernel = gaussian_kernel(sigma_cols);
        for row in buf.chunks_mut(width) {
            let smoothed = convolve_1d(row, &kernel, mode);
            row.copy_from_slice(&smoothed);
        }
    }

    if sigma_rows > 0.0 {
        let kernel = gaussian_kernel(sigma_rows);
        let mut column = vec![0f64; height];
        for x in 0..width {
            for (y, v) in column.iter_mut().enumerate() {
                *v = buf[y * width + x];
            }
            let smoothed = convolve_1d(&column, &kernel, mode);
            for (y, v) in smoothed.into_iter().enumerate() {
                buf[y * width + x] = v;
            }
        }
    }

    buf.into_iter().map(|v| v as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_radius_and_normalization() {
        let kernel = gaussian_kernel(0.7);
        assert_eq!(kernel.len(), 7);
        let sum: f64 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(kernel[3] > kernel[2] && kernel[2] > kernel[1]);
    }

    #[test]
    fn boundary_modes() {
        assert_eq!(source_index(-1, 4, BoundaryMode::Nearest), 0);
        assert_eq!(source_index(5, 4, BoundaryMode::Nearest), 3);
        assert_eq!(source_index(-1, 4, BoundaryMode::Mirror), 1);
        assert_eq!(source_index(-2, 4, BoundaryMode::Mirror), 2);
        assert_eq!(source_index(4, 4, BoundaryMode::Mirror), 2);
        assert_eq!(source_index(3, 1, BoundaryMode::Mirror), 0);
    }

    #[test]
    fn blur_spreads_an_impulse_symmetrically() {
        let mut data = vec![0f32; 9 * 9];
        data[4 * 9 + 4] = 1.0;
        let raster = raster_from_vec(9, 9, data).expect("raster");
        let blurred = gaussian_blur(&raster, 0.7, 0.7, BoundaryMode::Nearest).expect("blur");
        let px = blurred.as_slice();
        let total: f32 = px.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!((px[4 * 9 + 3] - px[4 * 9 + 5]).abs() < 1e-7);
        assert!((px[3 * 9 + 4] - px[5 * 9 + 4]).abs() < 1e-7);
        assert!(px[4 * 9 + 4] < 1.0);
    }

    #[test]
    fn anti_alias_sigma_only_when_shrinking() {
        assert_eq!(anti_alias_sigma(100, 200), 0.0);
        assert_eq!(anti_alias_sigma(300, 100), 1.0);
    }
}
