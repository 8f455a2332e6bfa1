//! Contour line rasterization.

use crate::tonal::Contour;
use crate::types::{MaskTile, RenderParams, TimeFreqWindow};

/// Rasterize contour traces into a 0/1 mask matching the geometry of a
/// spectrogram rendered for the same window.
///
/// Both frequency edges are snapped down to bin multiples, then
/// width = floor(span / step) and height = floor(band / resolution), the
/// exact shape the spectrogram renders for any window the recording covers.
/// Contours ending before the window or starting at/after its end are
/// dropped up front. Consecutive node pairs are walked in order; each
/// surviving segment is sampled at ceil(pixel distance) + 1 points, and every
/// in-bounds point sets a vertical stripe of `line_thickness` pixels centered
/// on the interpolated frequency row. A pair closer than 1e-10 time pixels
/// takes the second node's frequency row directly instead of interpolating.
///
/// A contour needs at least two nodes to draw anything.
pub fn render_mask(
    contours: &[Contour],
    params: &RenderParams,
    window: &TimeFreqWindow,
    line_thickness: usize,
) -> MaskTile {
    let res = params.freq_resolution();
    let max_freq = window.max_freq_hz - window.max_freq_hz % res;
    let min_freq = window.min_freq_hz - window.min_freq_hz % res;
    let start_ms = window.start_time_ms;
    let end_ms = window.end_time_ms;
    let time_span = window.time_span_ms();

    let width = (time_span / params.step_time_span_ms) as usize;
    let height = ((max_freq - min_freq) / res) as usize;
    let mut mask = MaskTile::zeros(width, height);
    if width == 0 || height == 0 {
        return mask;
    }

    let w = width as f64;
    let h = height as f64;

    for contour in contours {
        let (first, last) = match (contour.nodes.first(), contour.nodes.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => continue,
        };
        if last.time_s < start_ms / 1000.0 || first.time_s >= end_ms / 1000.0 {
            continue;
        }

        for pair in contour.nodes.windows(2) {
            let a_t = (pair[0].time_s * 1000.0 - start_ms) * w / time_span;
            let a_f = (max_freq - pair[0].freq_hz) / res;
            let b_t = (pair[1].time_s * 1000.0 - start_ms) * w / time_span;
            let b_f = (max_freq - pair[1].freq_hz) / res;

            // Nodes are time-ordered, so nothing after this pair can return
            // to the window.
            if a_t >= w {
                break;
            }
            if b_t < -0.5 {
                continue;
            }
            if (a_f < -0.5 && b_f < -0.5) || (a_f >= h && b_f >= h) {
                continue;
            }

            let distance = ((b_t - a_t).powi(2) + (b_f - a_f).powi(2)).sqrt();
            let points = distance.ceil() as usize + 1;
            for k in 0..points {
                let t = if points == 1 {
                    a_t
                } else {
                    a_t + (b_t - a_t) * k as f64 / (points - 1) as f64
                };

                let col = t.round();
                if col < 0.0 || col >= w {
                    continue;
                }

                let row = if b_t - a_t < 1e-10 {
                    b_f.round()
                } else {
                    (b_f + (a_f - b_f) / (a_t - b_t) * (t - b_t)).round()
                };
                if row < 0.0 || row >= h {
                    continue;
                }

                let (col, row) = (col as usize, row as usize);
                let lo = row.saturating_sub(line_thickness / 2);
                let hi = (row + (line_thickness + 1) / 2).min(height);
                for r in lo..hi {
                    mask.values[r * width + col] = 1.0;
                }
            }
        }
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tonal::TfNode;

    fn contour(nodes: &[(f64, f64)]) -> Contour {
        Contour::from_nodes(nodes.iter().map(|&(t, f)| TfNode::new(t, f)).collect())
    }

    fn window() -> TimeFreqWindow {
        TimeFreqWindow {
            start_time_ms: 0.0,
            end_time_ms: 32.0,
            min_freq_hz: 3000.0,
            max_freq_hz: 5000.0,
        }
    }

    fn col_rows(mask: &MaskTile, col: usize) -> Vec<usize> {
        (0..mask.height).filter(|&r| mask.at(r, col) != 0.0).collect()
    }

    #[test]
    fn test_single_node_draws_nothing() {
        let mask = render_mask(
            &[contour(&[(0.016, 4000.0)])],
            &RenderParams::default(),
            &window(),
            1,
        );
        assert_eq!((mask.width, mask.height), (16, 16));
        assert_eq!(mask.set_count(), 0);
    }

    #[test]
    fn test_horizontal_contour_stripes_every_column() {
        // Constant 4000 Hz maps to row (5000 - 4000) / 125 = 8.
        let mask = render_mask(
            &[contour(&[(0.0, 4000.0), (0.032, 4000.0)])],
            &RenderParams::default(),
            &window(),
            1,
        );
        for col in 0..mask.width {
            assert_eq!(col_rows(&mask, col), vec![8], "column {col}");
        }
    }

    #[test]
    fn test_line_thickness_widens_stripe() {
        let mask = render_mask(
            &[contour(&[(0.0, 4000.0), (0.032, 4000.0)])],
            &RenderParams::default(),
            &window(),
            3,
        );
        for col in 0..mask.width {
            assert_eq!(col_rows(&mask, col), vec![7, 8, 9], "column {col}");
        }
    }

    #[test]
    fn test_contour_outside_window_dropped() {
        let early = contour(&[(0.0, 4000.0), (0.01, 4100.0)]);
        let late = contour(&[(0.5, 4000.0), (0.6, 4100.0)]);
        let win = TimeFreqWindow {
            start_time_ms: 100.0,
            end_time_ms: 132.0,
            ..window()
        };
        let mask = render_mask(&[early, late], &RenderParams::default(), &win, 1);
        assert_eq!(mask.set_count(), 0);
    }

    #[test]
    fn test_spanning_contour_clipped_to_window() {
        // Runs 50..200 ms; only the 100..132 ms window is drawn.
        let win = TimeFreqWindow {
            start_time_ms: 100.0,
            end_time_ms: 132.0,
            ..window()
        };
        let mask = render_mask(
            &[contour(&[(0.05, 4000.0), (0.2, 4000.0)])],
            &RenderParams::default(),
            &win,
            1,
        );
        for col in 0..mask.width {
            assert_eq!(col_rows(&mask, col), vec![8], "column {col}");
        }
    }

    #[test]
    fn test_diagonal_interpolates_between_nodes() {
        // (0 ms, 3000 Hz) → (32 ms, 5000 Hz) crosses row 16 - col.
        let mask = render_mask(
            &[contour(&[(0.0, 3000.0), (0.032, 5000.0)])],
            &RenderParams::default(),
            &window(),
            1,
        );
        assert!(col_rows(&mask, 0).is_empty()); // row 16 is off the top edge
        for col in 1..mask.width {
            assert_eq!(col_rows(&mask, col), vec![16 - col], "column {col}");
        }
    }

    #[test]
    fn test_vertical_pair_uses_endpoint_frequency() {
        // Two nodes at the same instant: the second node's row wins, drawn
        // once at the shared column.
        let mask = render_mask(
            &[contour(&[(0.010, 3500.0), (0.010, 4500.0)])],
            &RenderParams::default(),
            &window(),
            1,
        );
        assert_eq!(mask.set_count(), 1);
        assert_eq!(mask.at(4, 5), 1.0); // (5000 - 4500) / 125 = row 4, 10 ms = col 5
    }

    #[test]
    fn test_band_edges_snapped_to_bins() {
        // 3010 / 5020 Hz snap down to 3000 / 5000 at 125 Hz bins, keeping a
        // 16-row mask.
        let win = TimeFreqWindow {
            min_freq_hz: 3010.0,
            max_freq_hz: 5020.0,
            ..window()
        };
        let mask = render_mask(
            &[contour(&[(0.0, 4000.0), (0.032, 4000.0)])],
            &RenderParams::default(),
            &win,
            1,
        );
        assert_eq!(mask.height, 16);
        assert_eq!(col_rows(&mask, 3), vec![8]);
    }
}
