/// Bins used for automatic threshold selection.
pub const OTSU_BINS: usize = 256;

/// Intensity histogram over the `[min, max]` range of a float image.
#[derive(Debug, Clone)]
pub struct Histogram {
    pub counts: Vec<u64>,
    pub min: f32,
    pub max: f32,
}

impl Histogram {
    /// `None` for empty input or input containing NaN/inf.
    pub fn from_pixels(pixels: &[f32], bins: usize) -> Option<Self> {
        if pixels.is_empty() || bins == 0 || pixels.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let min = pixels.iter().copied().fold(f32::INFINITY, f32::min);
        let max = pixels.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut counts = vec![0u64; bins];
        let range = max - min;
        for &value in pixels {
            let idx = if range > 0.0 {
                (((value - min) / range) * bins as f32) as usize
            } else {
                0
            };
            counts[idx.min(bins - 1)] += 1;
        }
        Some(Self { counts, min, max })
    }

    pub fn range(&self) -> f32 {
        self.max - self.min
    }

    pub fn bin_center(&self, idx: usize) -> f32 {
        let width = self.range() / self.counts.len() as f32;
        self.min + (idx as f32 + 0.5) * width
    }
}

/// Otsu's threshold: the bin center maximizing between-class variance, where the
/// lower class holds every bin up to and including the chosen one.
///
/// Returns `None` when the input is empty or has a single intensity.
pub fn otsu_threshold(pixels: &[f32]) -> Option<f32> {
    let histogram = Histogram::from_pixels(pixels, OTSU_BINS)?;
    if histogram.range() <= 0.0 {
        return None;
    }

    let total_pixels = pixels.len() as f64;
    let mut sum_total = 0f64;
    for (value, &count) in histogram.counts.iter().enumerate() {
        sum_total += value as f64 * count as f64;
    }

    let mut sum_background = 0f64;
    let mut weight_background = 0f64;
    let mut max_variance = f64::MIN;
    let mut threshold = 0usize;

    for (value, &count) in histogram.counts.iter().enumerate() {
        weight_background += count as f64;
        if weight_background == 0.0 {
            continue;
        }

        let weight_foreground = total_pixels - weight_background;
        if weight_foreground == 0.0 {
            break;
        }

        sum_background += value as f64 * count as f64;

        let mean_background = sum_background / weight_background;
        let mean_foreground = (sum_total - sum_background) / weight_foreground;
        let variance =
            weight_background * weight_foreground * (mean_background - mean_foreground).powi(2);

        if variance > max_variance {
            max_variance = variance;
            threshold = value;
        }
    }

    Some(histogram.bin_center(threshold))
}
