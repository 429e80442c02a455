//! Synthetic ECG sheets for tests and demos.
//!
//! A sheet is white paper with one dark sinusoidal trace inside each of the 13 lead
//! regions, scaled from the canonical layout to the requested size.

use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::config::{CANONICAL_HEIGHT, CANONICAL_WIDTH};
use crate::kornia::RawImage;
use crate::leads::LEAD_REGIONS;

const PAPER: u8 = 255;
const INK: u8 = 0;
/// Gap between a trace and its region border, in canonical pixels.
const MARGIN: f32 = 12.0;

/// Renders a sheet of `height` x `width` pixels.
pub fn ecg_sheet(height: u32, width: u32) -> GrayImage {
    let mut img = GrayImage::from_pixel(width, height, Luma([PAPER]));
    let sy = height as f32 / CANONICAL_HEIGHT as f32;
    let sx = width as f32 / CANONICAL_WIDTH as f32;
    let thickness = (3.0 * sy).round().max(1.0) as i32;

    for region in &LEAD_REGIONS {
        let top = region.rows.start as f32;
        let left = region.cols.start as f32 + MARGIN;
        let right = region.cols.end as f32 - MARGIN;
        let mid = top + region.height() as f32 / 2.0;
        let amplitude = region.height() as f32 / 4.0;
        let cycles = 1.0 + (region.number % 3) as f32;

        let steps = (right - left).max(1.0) as usize;
        let point = |i: usize| {
            let x = left + i as f32;
            let phase = (i as f32 / steps as f32) * cycles * std::f32::consts::TAU;
            (x * sx, (mid - amplitude * phase.sin()) * sy)
        };

        for i in 0..steps {
            let (x0, y0) = point(i);
            let (x1, y1) = point(i + 1);
            for dy in -(thickness / 2)..=(thickness / 2) {
                let dy = dy as f32;
                draw_line_segment_mut(&mut img, (x0, y0 + dy), (x1, y1 + dy), Luma([INK]));
            }
        }
    }
    img
}

/// A canonical-size sheet.
pub fn canonical_sheet() -> GrayImage {
    ecg_sheet(CANONICAL_HEIGHT as u32, CANONICAL_WIDTH as u32)
}

/// A featureless sheet of a single gray level.
pub fn uniform_sheet(height: u32, width: u32, level: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([level]))
}

/// The same sheet as RGBA with the given alpha everywhere.
pub fn to_rgba(sheet: &GrayImage, alpha: u8) -> RgbaImage {
    let mut out = RgbaImage::new(sheet.width(), sheet.height());
    for (x, y, Luma([v])) in sheet.enumerate_pixels() {
        out.put_pixel(x, y, Rgba([*v, *v, *v, alpha]));
    }
    out
}

/// Decoded form of `sheet`, as the normalizer receives it.
pub fn to_raw(sheet: &GrayImage) -> RawImage {
    RawImage::from_dynamic(&DynamicImage::ImageLuma8(sheet.clone()))
}
