use plotters::prelude::*;

use crate::signal::LeadSignal;

/// Panels per row, matching the printed 3 x 4 lead layout.
const COLUMNS: usize = 4;
const ROWS: usize = 3;
const PADDING: i32 = 8;

const TRACE_COLOR: RGBColor = RGBColor(20, 20, 20);
const FRAME_COLOR: RGBColor = RGBColor(230, 180, 180);

/// Maps one signal onto panel pixels. Samples are row coordinates of the traced
/// contour, so larger values are drawn lower, as on paper.
fn panel_points(samples: &[f64], width: i32, height: i32) -> Vec<(i32, i32)> {
    let inner_w = (width - 2 * PADDING).max(1) as f64;
    let inner_h = (height - 2 * PADDING).max(1) as f64;
    let last = samples.len().saturating_sub(1).max(1) as f64;
    samples
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let x = PADDING + (i as f64 / last * inner_w).round() as i32;
            let y = PADDING + (v.clamp(0.0, 1.0) * inner_h).round() as i32;
            (x, y)
        })
        .collect()
}

/// Renders the lead signals in a 3 x 4 grid as an RGBA pixel buffer. Panels are
/// filled in lead order; missing leads leave their panel empty.
pub fn render_signals_rgba(
    width: u32,
    height: u32,
    signals: &[LeadSignal],
) -> Result<Vec<u8>, String> {
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }

    let pixel_count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| "width*height overflow".to_string())?;

    let mut rgb = vec![255u8; pixel_count * 3];

    {
        let root = BitMapBackend::with_buffer(&mut rgb, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| e.to_string())?;

        let panels = root.split_evenly((ROWS, COLUMNS));
        for (panel, signal) in panels.iter().zip(signals) {
            let (w, h) = panel.dim_in_pixel();
            let (w, h) = (w as i32, h as i32);

            panel
                .draw(&Rectangle::new([(1, 1), (w - 2, h - 2)], FRAME_COLOR))
                .map_err(|e| e.to_string())?;

            let points = panel_points(&signal.samples, w, h);
            if points.len() > 1 {
                panel
                    .draw(&PathElement::new(points, TRACE_COLOR.stroke_width(2)))
                    .map_err(|e| e.to_string())?;
            }
        }

        root.present().map_err(|e| e.to_string())?;
    }

    let mut rgba = vec![255u8; pixel_count * 4];
    for (dst, src) in rgba.chunks_exact_mut(4).zip(rgb.chunks_exact(3)) {
        dst[..3].copy_from_slice(src);
    }
    Ok(rgba)
}
