//! Energy-guided mask widening.
//!
//! Annotated contour lines are one pixel wide, but the whistle energy they
//! trace usually bleeds into neighboring time bins. Expansion grows each
//! labeled pixel sideways along the time axis while the spectrogram stays
//! close to the seed's energy, so labels cover the visible extent of the call.

use serde::{Deserialize, Serialize};

use crate::types::{MaskTile, SpectrogramTile};

/// Controls for [`expand_mask`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExpandParams {
    /// Minimum candidate/seed energy ratio to keep growing.
    pub threshold: f32,
    /// Farthest column offset considered on each side of a seed.
    pub max_distance: usize,
    /// Minimum candidate/background ratio, if background gating is wanted.
    pub min_snr: Option<f32>,
}

impl Default for ExpandParams {
    fn default() -> Self {
        ExpandParams {
            threshold: 0.9,
            max_distance: 5,
            min_snr: Some(0.98),
        }
    }
}

/// Widen `mask` along the time axis wherever the spectrogram stays energetic.
///
/// Every labeled input pixel acts as a seed. From each seed the scan walks
/// left and right up to `max_distance` columns; a neighbor is labeled while
/// its energy holds at least `threshold` of the seed's and, when `min_snr` is
/// set, at least `min_snr` of the background level (the mean spectrogram
/// value over unlabeled input pixels). The first neighbor failing either test
/// stops that direction. Pixels already labeled in the input are stepped over
/// without testing, so a quiet labeled pixel never blocks the walk.
///
/// Growth is decided entirely against the input mask; the returned mask is a
/// widened copy and the input is left untouched. An all-zero mask comes back
/// unchanged, and zero-energy seeds do not grow.
///
/// Panics if the mask and spectrogram shapes differ.
pub fn expand_mask(
    mask: &MaskTile,
    spectrogram: &SpectrogramTile,
    params: &ExpandParams,
) -> MaskTile {
    assert_eq!(
        (mask.width, mask.height),
        (spectrogram.width, spectrogram.height),
        "mask and spectrogram shapes must match"
    );

    let mut out = mask.clone();
    let set: Vec<(usize, usize)> = (0..mask.height)
        .flat_map(|row| (0..mask.width).map(move |col| (row, col)))
        .filter(|&(row, col)| mask.at(row, col) != 0.0)
        .collect();
    if set.is_empty() {
        return out;
    }

    let background = {
        let mut sum = 0.0f64;
        let mut n = 0usize;
        for row in 0..mask.height {
            for col in 0..mask.width {
                if mask.at(row, col) == 0.0 {
                    sum += spectrogram.at(row, col) as f64;
                    n += 1;
                }
            }
        }
        // NaN when every pixel is labeled; growth then has no unlabeled
        // pixel left to claim.
        (sum / n as f64) as f32
    };

    for (row, col) in set {
        let seed = spectrogram.at(row, col);
        if seed == 0.0 {
            continue;
        }
        for dir in [-1isize, 1] {
            for k in 1..=params.max_distance {
                let probe = col as isize + dir * k as isize;
                if probe < 0 || probe >= mask.width as isize {
                    break;
                }
                let probe = probe as usize;
                if mask.at(row, probe) != 0.0 {
                    continue;
                }
                let candidate = spectrogram.at(row, probe);
                if let Some(min_snr) = params.min_snr {
                    if candidate / background < min_snr {
                        break;
                    }
                }
                if candidate / seed < params.threshold {
                    break;
                }
                out.values[row * out.width + probe] = 1.0;
            }
        }
    }

    out
}
