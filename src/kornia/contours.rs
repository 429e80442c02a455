//! Iso-contours of a float raster via marching squares, and the policy that picks the
//! ECG trace among them.

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::{GrayRaster, raster_shape};

/// Sub-pixel point on a contour, in `(row, col)` raster coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourPoint {
    pub row: f64,
    pub col: f64,
}

impl ContourPoint {
    fn key(self) -> (u64, u64) {
        (self.row.to_bits(), self.col.to_bits())
    }
}

/// An ordered chain of contour points. Closed contours repeat the first point at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<ContourPoint>,
}

impl Contour {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.points.len() > 2 && self.points.first() == self.points.last()
    }

    pub fn rows(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.row)
    }
}

type Segment = (ContourPoint, ContourPoint);

fn interpolate(level: f64, from: f64, to: f64) -> f64 {
    if to == from {
        return 0.0;
    }
    (level - from) / (to - from)
}

/// Line segments for every 2x2 cell that straddles `level`.
///
/// Saddle cells are resolved by joining the low-valued corners, and segments are
/// oriented so that higher values lie to the same side along a chain.
fn cell_segments(pixels: &[f32], height: usize, width: usize, level: f64) -> Vec<Segment> {
    let mut segments = Vec::new();
    if height < 2 || width < 2 {
        return segments;
    }

    for r0 in 0..height - 1 {
        for c0 in 0..width - 1 {
            let ul = pixels[r0 * width + c0] as f64;
            let ur = pixels[r0 * width + c0 + 1] as f64;
            let ll = pixels[(r0 + 1) * width + c0] as f64;
            let lr = pixels[(r0 + 1) * width + c0 + 1] as f64;
            if ul.is_nan() || ur.is_nan() || ll.is_nan() || lr.is_nan() {
                continue;
            }

            let mut case = 0u8;
            if ul > level {
                case |= 1;
            }
            if ur > level {
                case |= 2;
            }
            if ll > level {
                case |= 4;
            }
            if lr > level {
                case |= 8;
            }
            if case == 0 || case == 15 {
                continue;
            }

            let (r, c) = (r0 as f64, c0 as f64);
            let top = ContourPoint {
                row: r,
                col: c + interpolate(level, ul, ur),
            };
            let bottom = ContourPoint {
                row: r + 1.0,
                col: c + interpolate(level, ll, lr),
            };
            let left = ContourPoint {
                row: r + interpolate(level, ul, ll),
                col: c,
            };
            let right = ContourPoint {
                row: r + interpolate(level, ur, lr),
                col: c + 1.0,
            };

            match case {
                1 => segments.push((top, left)),
                2 => segments.push((right, top)),
                3 => segments.push((right, left)),
                4 => segments.push((left, bottom)),
                5 => segments.push((top, bottom)),
                6 => {
                    segments.push((right, top));
                    segments.push((left, bottom));
                }
                7 => segments.push((right, bottom)),
                8 => segments.push((bottom, right)),
                9 => {
                    segments.push((top, left));
                    segments.push((bottom, right));
                }
                10 => segments.push((bottom, top)),
                11 => segments.push((bottom, left)),
                12 => segments.push((left, right)),
                13 => segments.push((top, right)),
                14 => segments.push((left, top)),
                _ => {}
            }
        }
    }
    segments
}

/// Chains segments sharing endpoints into contours, ordered by when each chain was
/// started (top-to-bottom, left-to-right scan order).
fn assemble(segments: Vec<Segment>) -> Vec<Contour> {
    let mut next_id = 0usize;
    let mut chains: BTreeMap<usize, VecDeque<ContourPoint>> = BTreeMap::new();
    let mut starts: HashMap<(u64, u64), usize> = HashMap::new();
    let mut ends: HashMap<(u64, u64), usize> = HashMap::new();

    for (from, to) in segments {
        if from == to {
            continue;
        }
        let tail = starts.remove(&to.key());
        let head = ends.remove(&from.key());

        match (tail, head) {
            (Some(t), Some(h)) if t == h => {
                if let Some(chain) = chains.get_mut(&h) {
                    chain.push_back(to);
                }
            }
            (Some(t), Some(h)) => {
                // Keep the older chain so ordering stays stable.
                if t > h {
                    let Some(tail_chain) = chains.remove(&t) else {
                        continue;
                    };
                    let Some(head_chain) = chains.get_mut(&h) else {
                        continue;
                    };
                    head_chain.extend(tail_chain);
                    if let (Some(first), Some(last)) = (head_chain.front(), head_chain.back()) {
                        starts.insert(first.key(), h);
                        ends.insert(last.key(), h);
                    }
                } else {
                    let Some(head_chain) = chains.remove(&h) else {
                        continue;
                    };
                    if let Some(first) = head_chain.front() {
                        starts.remove(&first.key());
                    }
                    let Some(tail_chain) = chains.get_mut(&t) else {
                        continue;
                    };
                    for point in head_chain.into_iter().rev() {
                        tail_chain.push_front(point);
                    }
                    if let (Some(first), Some(last)) = (tail_chain.front(), tail_chain.back()) {
                        starts.insert(first.key(), t);
                        ends.insert(last.key(), t);
                    }
                }
            }
            (None, None) => {
                chains.insert(next_id, VecDeque::from([from, to]));
                starts.insert(from.key(), next_id);
                ends.insert(to.key(), next_id);
                next_id += 1;
            }
            (Some(t), None) => {
                if let Some(chain) = chains.get_mut(&t) {
                    chain.push_front(from);
                    starts.insert(from.key(), t);
                }
            }
            (None, Some(h)) => {
                if let Some(chain) = chains.get_mut(&h) {
                    chain.push_back(to);
                    ends.insert(to.key(), h);
                }
            }
        }
    }

    chains
        .into_values()
        .map(|chain| Contour {
            points: chain.into_iter().collect(),
        })
        .collect()
}

/// All iso-contours of `raster` at `level`.
pub fn find_contours(raster: &GrayRaster, level: f32) -> Vec<Contour> {
    let (height, width) = raster_shape(raster);
    assemble(cell_segments(raster.as_slice(), height, width, level as f64))
}

/// Picks the trace: contours are stably sorted by point count, largest first, and the
/// first one is taken. Among equally long contours the earliest found wins.
pub fn select_largest(contours: &[Contour]) -> Option<&Contour> {
    let mut ranked: Vec<&Contour> = contours.iter().filter(|c| !c.is_empty()).collect();
    ranked.sort_by(|a, b| b.len().cmp(&a.len()));
    ranked.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kornia::raster_from_vec;

    fn raster(height: usize, width: usize, on: &[(usize, usize)]) -> GrayRaster {
        let mut data = vec![0f32; height * width];
        for &(r, c) in on {
            data[r * width + c] = 1.0;
        }
        raster_from_vec(height, width, data).expect("raster")
    }

    #[test]
    fn single_pixel_gives_closed_diamond() {
        let contours = find_contours(&raster(3, 3, &[(1, 1)]), 0.5);
        assert_eq!(contours.len(), 1);
        let contour = &contours[0];
        assert!(contour.is_closed());
        assert_eq!(contour.len(), 5);
        let rows: Vec<f64> = contour.rows().collect();
        assert!(rows.iter().any(|&r| (r - 0.5).abs() < 1e-9));
        assert!(rows.iter().any(|&r| (r - 1.5).abs() < 1e-9));
    }

    #[test]
    fn blob_touching_border_is_open() {
        let contours = find_contours(&raster(3, 4, &[(0, 1), (0, 2)]), 0.5);
        assert_eq!(contours.len(), 1);
        assert!(!contours[0].is_closed());
    }

    #[test]
    fn diagonal_neighbours_stay_separate() {
        let contours = find_contours(&raster(4, 4, &[(1, 1), (2, 2)]), 0.5);
        assert_eq!(contours.len(), 2);
    }

    #[test]
    fn level_controls_crossing_position() {
        let contours = find_contours(&raster(3, 3, &[(1, 1)]), 0.8);
        let contour = &contours[0];
        assert!(contour.rows().any(|r| (r - 0.8).abs() < 1e-6));
    }

    #[test]
    fn flat_raster_has_no_contours() {
        assert!(find_contours(&raster(5, 5, &[]), 0.8).is_empty());
    }

    #[test]
    fn largest_wins_and_ties_keep_first() {
        let point = |row: f64| ContourPoint { row, col: 0.0 };
        let small = Contour {
            points: vec![point(0.0), point(1.0)],
        };
        let first_big = Contour {
            points: vec![point(0.0), point(1.0), point(2.0)],
        };
        let second_big = Contour {
            points: vec![point(5.0), point(6.0), point(7.0)],
        };
        let contours = vec![small, first_big.clone(), second_big];
        assert_eq!(select_largest(&contours), Some(&first_big));
        assert_eq!(select_largest(&[]), None);
    }
}
