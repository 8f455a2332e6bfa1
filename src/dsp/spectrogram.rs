//! Spectrogram rendering over framed audio.

use std::cell::RefCell;

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use thiserror::Error;

use super::frame::FrameSet;
use crate::types::{RenderParams, Scale, SpectrogramTile, TimeFreqWindow};

thread_local! {
    static FFT_PLANNER: RefCell<RealFftPlanner<f32>> = RefCell::new(RealFftPlanner::new());
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no whole frame fits in [{start_time_ms} ms, {end_time_ms} ms)")]
    InsufficientSamples { start_time_ms: f64, end_time_ms: f64 },
}

/// Raw complex spectrum over one window: no log scaling and no frequency
/// flip, row 0 holding the lowest selected bin. Used for range probing, so
/// an empty frame set yields an empty spectrum rather than an error.
#[derive(Clone, Debug)]
pub struct ComplexSpectrum {
    pub width: usize,
    pub height: usize,
    pub values: Vec<Complex<f32>>,
    pub actual_end_time_ms: f64,
}

/// Render framed audio into a scaled-magnitude spectrogram tile.
///
/// Each frame is transformed at its natural length (no zero padding), bins
/// `[floor(min_freq / res), floor(max_freq / res))` are kept (clamped to the
/// bins the frame length provides), magnitudes go through log10, and the
/// frequency axis is flipped so row 0 is the highest selected frequency.
/// `Normalized` output clips to `[clip_min, clip_max]` and rescales to
/// `[0, 1]`; `Decibel` output is `20 * log10(magnitude)`, unclipped.
///
/// `actual_end_time_ms` on the tile is `start + frames * step`; it falls
/// short of the requested end when the waveform ran out. Zero frames is
/// [`RenderError::InsufficientSamples`].
pub fn render_spectrogram(
    frames: &FrameSet,
    params: &RenderParams,
    window: &TimeFreqWindow,
) -> Result<SpectrogramTile, RenderError> {
    if frames.is_empty() {
        return Err(RenderError::InsufficientSamples {
            start_time_ms: window.start_time_ms,
            end_time_ms: window.end_time_ms,
        });
    }

    let (n_bins, spectra) = fft_frames(frames);
    let (clip_bottom, clip_top) = bin_range(params, window, n_bins);

    let width = frames.count;
    let height = clip_top - clip_bottom;
    let mut values = vec![0f32; width * height];

    for col in 0..width {
        let spectrum = &spectra[col * n_bins..(col + 1) * n_bins];
        for (row, bin) in (clip_bottom..clip_top).rev().enumerate() {
            values[row * width + col] = spectrum[bin].norm().log10();
        }
    }

    match params.scale {
        Scale::Decibel => {
            for v in values.iter_mut() {
                *v *= 20.0;
            }
        }
        Scale::Normalized => {
            let span = params.clip_max - params.clip_min;
            for v in values.iter_mut() {
                *v = (v.clamp(params.clip_min, params.clip_max) - params.clip_min) / span;
            }
        }
    }

    Ok(SpectrogramTile {
        width,
        height,
        values,
        actual_end_time_ms: window.start_time_ms + width as f64 * params.step_time_span_ms,
    })
}

/// Render the raw complex spectrum for one window. Empty input is a valid
/// empty spectrum ending where it started.
pub fn render_complex_spectrogram(
    frames: &FrameSet,
    params: &RenderParams,
    window: &TimeFreqWindow,
) -> ComplexSpectrum {
    if frames.is_empty() {
        return ComplexSpectrum {
            width: 0,
            height: 0,
            values: Vec::new(),
            actual_end_time_ms: window.start_time_ms,
        };
    }

    let (n_bins, spectra) = fft_frames(frames);
    let (clip_bottom, clip_top) = bin_range(params, window, n_bins);

    let width = frames.count;
    let height = clip_top - clip_bottom;
    let mut values = vec![Complex::new(0f32, 0f32); width * height];

    for col in 0..width {
        let spectrum = &spectra[col * n_bins..(col + 1) * n_bins];
        for (row, bin) in (clip_bottom..clip_top).enumerate() {
            values[row * width + col] = spectrum[bin];
        }
    }

    ComplexSpectrum {
        width,
        height,
        values,
        actual_end_time_ms: window.start_time_ms + width as f64 * params.step_time_span_ms,
    }
}

/// Forward real FFT of every frame, reusing one plan and one pair of
/// buffers. Returns frame-major spectra of `n_bins = frame_len / 2 + 1`.
fn fft_frames(frames: &FrameSet) -> (usize, Vec<Complex<f32>>) {
    let fft = FFT_PLANNER.with(|p| p.borrow_mut().plan_fft_forward(frames.frame_len));
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let n_bins = spectrum.len();

    let mut spectra = Vec::with_capacity(frames.count * n_bins);
    for i in 0..frames.count {
        input.copy_from_slice(frames.frame(i));
        fft.process(&mut input, &mut spectrum).expect("FFT failed");
        spectra.extend_from_slice(&spectrum);
    }
    (n_bins, spectra)
}

fn bin_range(params: &RenderParams, window: &TimeFreqWindow, n_bins: usize) -> (usize, usize) {
    let res = params.freq_resolution();
    let clip_bottom = (((window.min_freq_hz / res).floor()).max(0.0) as usize).min(n_bins);
    let clip_top = (((window.max_freq_hz / res).floor()).max(0.0) as usize).min(n_bins);
    (clip_bottom, clip_top.max(clip_bottom))
}
