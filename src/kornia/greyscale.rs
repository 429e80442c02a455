//! Image normalizer: decoded pixels of any supported channel layout in, canonical
//! grayscale raster out.

use std::path::Path;

use image::{DynamicImage, GenericImageView};
use kornia::image::{ImageError, ImageSize, allocator::CpuAllocator};
use kornia::imgproc;
use kornia::imgproc::interpolation::InterpolationMode;

use super::filter::{BoundaryMode, anti_alias_sigma, gaussian_blur};
use super::{GrayRaster, raster_from_vec, raster_shape};
use crate::config::{CANONICAL_HEIGHT, CANONICAL_WIDTH};
use crate::error::EcgError;

// Luminance weights the downstream artifacts were fit with.
const WEIGHT_R: f32 = 0.2125;
const WEIGHT_G: f32 = 0.7154;
const WEIGHT_B: f32 = 0.0721;

/// Channel layout of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// A 2D array with no channel axis.
    Planar,
    /// An interleaved `(H, W, C)` array.
    Channels(usize),
}

impl ChannelLayout {
    pub fn samples_per_pixel(self) -> usize {
        match self {
            ChannelLayout::Planar => 1,
            ChannelLayout::Channels(c) => c,
        }
    }
}

/// Decoded pixels with intensities scaled to [0, 1].
#[derive(Debug, Clone)]
pub struct RawImage {
    height: usize,
    width: usize,
    layout: ChannelLayout,
    data: Vec<f32>,
}

impl RawImage {
    pub fn new(
        height: usize,
        width: usize,
        layout: ChannelLayout,
        data: Vec<f32>,
    ) -> Result<Self, EcgError> {
        if let ChannelLayout::Channels(channels) = layout
            && !(1..=4).contains(&channels)
        {
            return Err(EcgError::UnsupportedChannelLayout { channels });
        }
        let expected = height * width * layout.samples_per_pixel();
        if data.len() != expected {
            return Err(EcgError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            height,
            width,
            layout,
            data,
        })
    }

    /// Reads and decodes a JPEG/PNG (or any format the `image` crate knows).
    pub fn open(path: &Path) -> Result<Self, EcgError> {
        let decoded = image::open(path).map_err(|source| EcgError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_dynamic(&decoded))
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        let (width, height) = (width as usize, height as usize);
        let (layout, data) = match image {
            DynamicImage::ImageLuma8(b) => (ChannelLayout::Planar, scale_u8(b.as_raw())),
            DynamicImage::ImageLumaA8(b) => (ChannelLayout::Channels(2), scale_u8(b.as_raw())),
            DynamicImage::ImageRgb8(b) => (ChannelLayout::Channels(3), scale_u8(b.as_raw())),
            DynamicImage::ImageRgba8(b) => (ChannelLayout::Channels(4), scale_u8(b.as_raw())),
            DynamicImage::ImageLuma16(b) => (ChannelLayout::Planar, scale_u16(b.as_raw())),
            DynamicImage::ImageLumaA16(b) => (ChannelLayout::Channels(2), scale_u16(b.as_raw())),
            DynamicImage::ImageRgb16(b) => (ChannelLayout::Channels(3), scale_u16(b.as_raw())),
            DynamicImage::ImageRgba16(b) => (ChannelLayout::Channels(4), scale_u16(b.as_raw())),
            DynamicImage::ImageRgb32F(b) => (ChannelLayout::Channels(3), clamp_f32(b.as_raw())),
            DynamicImage::ImageRgba32F(b) => (ChannelLayout::Channels(4), clamp_f32(b.as_raw())),
            other => (
                ChannelLayout::Channels(4),
                clamp_f32(other.to_rgba32f().as_raw()),
            ),
        };
        Self {
            height,
            width,
            layout,
            data,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Collapses the pixels to one luminance value each.
    ///
    /// Planar input is already gray. A single channel is replicated to RGB, a second
    /// channel is treated as alpha and dropped, and a fourth (alpha) channel is
    /// ignored before the weighted RGB conversion.
    fn gray_values(&self) -> Vec<f32> {
        match self.layout {
            ChannelLayout::Planar => self.data.clone(),
            ChannelLayout::Channels(1) => self.data.iter().map(|&v| luminance(v, v, v)).collect(),
            ChannelLayout::Channels(2) => self
                .data
                .chunks_exact(2)
                .map(|px| luminance(px[0], px[0], px[0]))
                .collect(),
            ChannelLayout::Channels(c) => self
                .data
                .chunks_exact(c)
                .map(|px| luminance(px[0], px[1], px[2]))
                .collect(),
        }
    }
}

fn scale_u8(raw: &[u8]) -> Vec<f32> {
    raw.iter().map(|&v| v as f32 / 255.0).collect()
}

fn scale_u16(raw: &[u16]) -> Vec<f32> {
    raw.iter().map(|&v| v as f32 / 65535.0).collect()
}

fn clamp_f32(raw: &[f32]) -> Vec<f32> {
    raw.iter().map(|&v| v.clamp(0.0, 1.0)).collect()
}

pub fn luminance(r: f32, g: f32, b: f32) -> f32 {
    WEIGHT_R * r + WEIGHT_G * g + WEIGHT_B * b
}

/// Applies the channel policy without resizing.
pub fn to_grayscale(raw: &RawImage) -> Result<GrayRaster, EcgError> {
    let gray = raw
        .gray_values()
        .into_iter()
        .map(|v| v.clamp(0.0, 1.0))
        .collect();
    Ok(raster_from_vec(raw.height, raw.width, gray)?)
}

/// Resamples `src` to `height` x `width`. Same-size input is copied unchanged.
pub fn resize_with(
    src: &GrayRaster,
    height: usize,
    width: usize,
    interpolation: InterpolationMode,
) -> Result<GrayRaster, ImageError> {
    let (src_height, src_width) = raster_shape(src);
    if (src_height, src_width) == (height, width) {
        return raster_from_vec(height, width, src.as_slice().to_vec());
    }

    let mut resized = GrayRaster::from_size_val(ImageSize { width, height }, 0.0, CpuAllocator)?;
    imgproc::resize::resize_native(src, &mut resized, interpolation)?;
    let data = resized.as_slice().iter().map(|v| v.clamp(0.0, 1.0)).collect();
    raster_from_vec(height, width, data)
}

/// Bilinear resize with the anti-alias prefilter used for photographs and scans.
pub fn resize_smooth(src: &GrayRaster, height: usize, width: usize) -> Result<GrayRaster, ImageError> {
    let (src_height, src_width) = raster_shape(src);
    let sigma_rows = anti_alias_sigma(src_height, height);
    let sigma_cols = anti_alias_sigma(src_width, width);
    if sigma_rows > 0.0 || sigma_cols > 0.0 {
        let smoothed = gaussian_blur(src, sigma_rows, sigma_cols, BoundaryMode::Mirror)?;
        resize_with(&smoothed, height, width, InterpolationMode::Bilinear)
    } else {
        resize_with(src, height, width, InterpolationMode::Bilinear)
    }
}

/// Canonicalizes a decoded image: grayscale, [0, 1], 1572 x 2213.
pub fn normalize(raw: &RawImage) -> Result<GrayRaster, EcgError> {
    let gray = to_grayscale(raw)?;
    Ok(resize_smooth(&gray, CANONICAL_HEIGHT, CANONICAL_WIDTH)?)
}
