pub mod contours;
pub use contours::{Contour, ContourPoint, find_contours, select_largest};
pub mod filter;
pub use filter::{BoundaryMode, gaussian_blur};
pub mod greyscale;
pub use greyscale::{ChannelLayout, RawImage, normalize};
pub mod histogram;
pub use histogram::{Histogram, otsu_threshold};

use kornia::image::{Image, ImageError, ImageSize, allocator::CpuAllocator};

pub type CpuImage<T, const C: usize> = Image<T, C, CpuAllocator>;

/// Single-channel `f32` raster, intensities in [0, 1].
pub type GrayRaster = CpuImage<f32, 1>;

pub fn raster_from_vec(height: usize, width: usize, data: Vec<f32>) -> Result<GrayRaster, ImageError> {
    GrayRaster::new(ImageSize { width, height }, data, CpuAllocator)
}

/// `(height, width)` of a raster.
pub fn raster_shape(raster: &GrayRaster) -> (usize, usize) {
    let size = raster.size();
    (size.height, size.width)
}
