//! Lead segmenter: cuts the canonical raster into the 13 fixed regions of a printed
//! 12-lead sheet.
//!
//! The boundaries are literal pixel offsets chosen for the 1572 x 2213 canonical
//! raster. They are not proportional to the sheet and must not be scaled; a different
//! canonical size needs its own table.

use std::ops::Range;

use crate::config::{CANONICAL_HEIGHT, CANONICAL_WIDTH, LEAD_COUNT, REGION_COUNT};
use crate::error::EcgError;
use crate::kornia::{GrayRaster, raster_from_vec, raster_shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Lead,
    RhythmStrip,
}

/// A fixed rectangle of the canonical raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadRegion {
    /// 1-based position in lead-index order.
    pub number: usize,
    pub kind: RegionKind,
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl LeadRegion {
    pub fn height(&self) -> usize {
        self.rows.end - self.rows.start
    }

    pub fn width(&self) -> usize {
        self.cols.end - self.cols.start
    }
}

const fn lead(number: usize, rows: Range<usize>, cols: Range<usize>) -> LeadRegion {
    LeadRegion {
        number,
        kind: RegionKind::Lead,
        rows,
        cols,
    }
}

const ROW_1: Range<usize> = 300..600;
const ROW_2: Range<usize> = 600..900;
const ROW_3: Range<usize> = 900..1200;
const COL_1: Range<usize> = 150..643;
const COL_2: Range<usize> = 646..1135;
const COL_3: Range<usize> = 1140..1625;
const COL_4: Range<usize> = 1630..2125;

/// Regions 1-12 form a 3 x 4 grid read row by row; region 13 is the rhythm strip
/// spanning the grid's full width.
pub static LEAD_REGIONS: [LeadRegion; REGION_COUNT] = [
    lead(1, ROW_1, COL_1),
    lead(2, ROW_1, COL_2),
    lead(3, ROW_1, COL_3),
    lead(4, ROW_1, COL_4),
    lead(5, ROW_2, COL_1),
    lead(6, ROW_2, COL_2),
    lead(7, ROW_2, COL_3),
    lead(8, ROW_2, COL_4),
    lead(9, ROW_3, COL_1),
    lead(10, ROW_3, COL_2),
    lead(11, ROW_3, COL_3),
    lead(12, ROW_3, COL_4),
    LeadRegion {
        number: 13,
        kind: RegionKind::RhythmStrip,
        rows: 1250..1480,
        cols: 150..2125,
    },
];

/// A region together with its pixels.
pub struct LeadCrop {
    pub region: &'static LeadRegion,
    pub image: GrayRaster,
}

/// Copies `rows x cols` out of `image`.
pub fn crop(image: &GrayRaster, rows: Range<usize>, cols: Range<usize>) -> Result<GrayRaster, EcgError> {
    let (height, width) = raster_shape(image);
    if rows.start > rows.end || cols.start > cols.end || rows.end > height || cols.end > width {
        return Err(EcgError::RegionBounds {
            expected_height: rows.end,
            expected_width: cols.end,
            actual_height: height,
            actual_width: width,
        });
    }
    let pixels = image.as_slice();
    let mut data = Vec::with_capacity((rows.end - rows.start) * (cols.end - cols.start));
    for r in rows.clone() {
        data.extend_from_slice(&pixels[r * width + cols.start..r * width + cols.end]);
    }
    Ok(raster_from_vec(rows.end - rows.start, cols.end - cols.start, data)?)
}

/// Splits a canonical raster into all 13 regions, in region order.
pub fn segment_leads(canonical: &GrayRaster) -> Result<Vec<LeadCrop>, EcgError> {
    let (height, width) = raster_shape(canonical);
    if (height, width) != (CANONICAL_HEIGHT, CANONICAL_WIDTH) {
        return Err(EcgError::RegionBounds {
            expected_height: CANONICAL_HEIGHT,
            expected_width: CANONICAL_WIDTH,
            actual_height: height,
            actual_width: width,
        });
    }
    LEAD_REGIONS
        .iter()
        .map(|region| {
            Ok(LeadCrop {
                region,
                image: crop(canonical, region.rows.clone(), region.cols.clone())?,
            })
        })
        .collect()
}

/// The 12 vectorized leads. The rhythm strip is segmented but not vectorized, since
/// the frozen artifacts consume exactly 12 leads.
pub fn standard_leads(crops: &[LeadCrop]) -> &[LeadCrop] {
    &crops[..crops.len().min(LEAD_COUNT)]
}

/// Pastes crops back at their region coordinates on a `fill`-valued canvas.
pub fn stitch(crops: &[LeadCrop], height: usize, width: usize, fill: f32) -> Result<GrayRaster, EcgError> {
    let mut canvas = vec![fill; height * width];
    for crop in crops {
        let region = crop.region;
        let (crop_height, crop_width) = raster_shape(&crop.image);
        if region.rows.end > height
            || region.cols.end > width
            || crop_height != region.height()
            || crop_width != region.width()
        {
            return Err(EcgError::RegionBounds {
                expected_height: region.rows.end,
                expected_width: region.cols.end,
                actual_height: height,
                actual_width: width,
            });
        }
        let pixels = crop.image.as_slice();
        for (i, r) in region.rows.clone().enumerate() {
            let src = &pixels[i * crop_width..(i + 1) * crop_width];
            canvas[r * width + region.cols.start..r * width + region.cols.end].copy_from_slice(src);
        }
    }
    Ok(raster_from_vec(height, width, canvas)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_lie_inside_canonical_raster() {
        for region in &LEAD_REGIONS {
            assert!(region.rows.end <= CANONICAL_HEIGHT);
            assert!(region.cols.end <= CANONICAL_WIDTH);
            assert!(region.height() > 0 && region.width() > 0);
        }
    }

    #[test]
    fn grid_regions_do_not_overlap() {
        for (i, a) in LEAD_REGIONS.iter().enumerate() {
            for b in LEAD_REGIONS.iter().skip(i + 1) {
                let rows_overlap = a.rows.start < b.rows.end && b.rows.start < a.rows.end;
                let cols_overlap = a.cols.start < b.cols.end && b.cols.start < a.cols.end;
                assert!(
                    !(rows_overlap && cols_overlap),
                    "regions {} and {} overlap",
                    a.number,
                    b.number
                );
            }
        }
    }

    #[test]
    fn crop_out_of_bounds_fails() {
        let image = raster_from_vec(4, 4, vec![0.0; 16]).expect("raster");
        assert!(matches!(crop(&image, 0..5, 0..2), Err(EcgError::RegionBounds { .. })));
    }
}
