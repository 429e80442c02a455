//! Signal extractor: turns one lead crop into a normalized 1D trace.

use kornia::imgproc::interpolation::InterpolationMode;
use rayon::prelude::*;
use tracing::debug;

use crate::config::ExtractorConfig;
use crate::error::EcgError;
use crate::kornia::filter::{
    BoundaryMode, anti_alias_sigma, convolve_1d, gaussian_blur_pixels, gaussian_kernel, source_index,
};
use crate::kornia::greyscale::{resize_with, to_grayscale};
use crate::kornia::{
    GrayRaster, RawImage, find_contours, otsu_threshold, raster_from_vec, raster_shape,
    select_largest,
};
use crate::leads::LeadCrop;

/// Crops whose blurred intensity range is narrower than this carry no trace.
const MIN_CONTRAST: f32 = 1e-4;

/// The normalized amplitude trace of one lead.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadSignal {
    /// 1-based lead number.
    pub lead: usize,
    pub samples: Vec<f64>,
}

impl LeadSignal {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalExtractor {
    config: ExtractorConfig,
}

impl SignalExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extracts a lead supplied on its own, in any channel layout the normalizer accepts.
    pub fn extract_raw(&self, lead: usize, raw: &RawImage) -> Result<LeadSignal, EcgError> {
        let gray = to_grayscale(raw)?;
        self.extract(lead, &gray)
    }

    /// Blur, Otsu-binarize, shrink to the working resolution, trace the largest
    /// contour and resample its row coordinate to `samples_per_lead` values in [0, 1].
    pub fn extract(&self, lead: usize, crop: &GrayRaster) -> Result<LeadSignal, EcgError> {
        let (height, width) = raster_shape(crop);
        self.extract_pixels(lead, height, width, crop.as_slice())
    }

    fn extract_pixels(
        &self,
        lead: usize,
        height: usize,
        width: usize,
        crop: &[f32],
    ) -> Result<LeadSignal, EcgError> {
        let no_signal = |reason: &str| EcgError::NoSignalDetected {
            lead,
            reason: reason.to_string(),
        };

        let sigma = self.config.gaussian_sigma as f64;
        let blurred = gaussian_blur_pixels(crop, height, width, sigma, sigma, BoundaryMode::Nearest);
        let pixels = blurred.as_slice();
        if pixels.is_empty() {
            return Err(no_signal("empty region"));
        }

        let (lo, hi) = pixels
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if !(hi - lo >= MIN_CONTRAST) {
            return Err(no_signal("no contrast"));
        }
        let threshold = otsu_threshold(pixels).ok_or_else(|| no_signal("no contrast"))?;

        // Ink is darker than the threshold.
        let mask: Vec<f32> = pixels
            .iter()
            .map(|&v| if v < threshold { 1.0 } else { 0.0 })
            .collect();
        let mask = raster_from_vec(height, width, mask)?;
        let mask = resize_with(
            &mask,
            self.config.working_height,
            self.config.working_width,
            InterpolationMode::Nearest,
        )?;

        let contours = find_contours(&mask, self.config.contour_level);
        let trace = select_largest(&contours).ok_or_else(|| no_signal("no contours found"))?;
        debug!(
            lead,
            threshold,
            contours = contours.len(),
            points = trace.len(),
            "selected trace contour"
        );

        let rows: Vec<f64> = trace.rows().collect();
        let resampled = resample_linear(&rows, self.config.samples_per_lead);
        let samples = min_max_normalize(&resampled).ok_or_else(|| no_signal("constant trace"))?;
        Ok(LeadSignal { lead, samples })
    }

    /// Extracts every crop, optionally on the rayon pool. Signals come back in crop
    /// order, and when several leads fail the lowest-numbered failure is reported.
    ///
    /// The workers borrow the crops' pixel slices; the raster type itself is not shared
    /// across threads.
    pub fn extract_all(&self, crops: &[LeadCrop], parallel: bool) -> Result<Vec<LeadSignal>, EcgError> {
        let inputs: Vec<(usize, usize, usize, &[f32])> = crops
            .iter()
            .map(|crop| {
                let (height, width) = raster_shape(&crop.image);
                (crop.region.number, height, width, crop.image.as_slice())
            })
            .collect();

        let run = |&(lead, height, width, pixels): &(usize, usize, usize, &[f32])| {
            self.extract_pixels(lead, height, width, pixels)
        };

        let results: Vec<Result<LeadSignal, EcgError>> = if parallel {
            inputs.par_iter().map(run).collect()
        } else {
            inputs.iter().map(run).collect()
        };
        results.into_iter().collect()
    }
}

/// Resamples `input` to `len` values by linear interpolation between sample centers,
/// mirroring past both ends. Shrinking applies a Gaussian anti-alias prefilter first.
pub fn resample_linear(input: &[f64], len: usize) -> Vec<f64> {
    if input.is_empty() || len == 0 {
        return Vec::new();
    }
    if input.len() == len {
        return input.to_vec();
    }

    let sigma = anti_alias_sigma(input.len(), len);
    let source = if sigma > 0.0 {
        convolve_1d(input, &gaussian_kernel(sigma), BoundaryMode::Mirror)
    } else {
        input.to_vec()
    };

    let n = source.len();
    let scale = n as f64 / len as f64;
    (0..len)
        .map(|i| {
            let x = (i as f64 + 0.5) * scale - 0.5;
            let left = x.floor();
            let frac = x - left;
            let left = left as isize;
            let a = source[source_index(left, n, BoundaryMode::Mirror)];
            let b = source[source_index(left + 1, n, BoundaryMode::Mirror)];
            a + (b - a) * frac
        })
        .collect()
}

/// Maps `values` onto [0, 1]. `None` when the values are constant or not finite.
pub fn min_max_normalize(values: &[f64]) -> Option<Vec<f64>> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !(range.is_finite() && range > 0.0) {
        return None;
    }
    Some(values.iter().map(|&v| ((v - min) / range).clamp(0.0, 1.0)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripe(height: usize, width: usize) -> GrayRaster {
        let mut data = vec![1.0f32; height * width];
        for c in 0..width {
            let phase = c as f64 / width as f64 * std::f64::consts::TAU * 2.0;
            let center = (height as f64 / 2.0 + phase.sin() * height as f64 / 4.0) as usize;
            for r in center.saturating_sub(2)..(center + 3).min(height) {
                data[r * width + c] = 0.0;
            }
        }
        raster_from_vec(height, width, data).expect("raster")
    }

    #[test]
    fn resample_keeps_length_and_order() {
        let input: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let up = resample_linear(&input, 20);
        assert_eq!(up.len(), 20);
        assert!(up.windows(2).all(|w| w[1] >= w[0]));
        let down = resample_linear(&input, 5);
        assert_eq!(down.len(), 5);
        assert_eq!(resample_linear(&input, 10), input);
    }

    #[test]
    fn resample_interpolates_between_centers() {
        let up = resample_linear(&[0.0, 1.0], 4);
        // Centers of the 4 outputs fall at -0.25, 0.25, 0.75, 1.25 on the input grid.
        let expected = [0.25, 0.25, 0.75, 0.75];
        for (got, want) in up.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{up:?}");
        }
    }

    #[test]
    fn min_max_rejects_constant() {
        assert!(min_max_normalize(&[3.0; 8]).is_none());
        let normalized = min_max_normalize(&[2.0, 4.0, 3.0]).expect("normalized");
        assert_eq!(normalized, vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn stripe_yields_full_range_signal() {
        let extractor = SignalExtractor::default();
        let signal = extractor.extract(1, &stripe(120, 240)).expect("signal");
        assert_eq!(signal.len(), 255);
        assert!(signal.samples.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(signal.samples.contains(&0.0));
        assert!(signal.samples.contains(&1.0));
    }

    #[test]
    fn blank_crop_has_no_signal() {
        let extractor = SignalExtractor::default();
        let blank = raster_from_vec(50, 80, vec![0.6; 50 * 80]).expect("raster");
        assert!(matches!(
            extractor.extract(4, &blank),
            Err(EcgError::NoSignalDetected { lead: 4, .. })
        ));
    }
}
