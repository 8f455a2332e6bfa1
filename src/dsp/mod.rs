//! Signal processing: framing and spectrogram rendering.

pub mod frame;
pub mod spectrogram;

pub use frame::{extract_frames, FrameSet};
pub use spectrogram::{
    render_complex_spectrogram, render_spectrogram, ComplexSpectrum, RenderError,
};

/// Per-frame weight function: given a frame length, return that many weights.
pub type WindowFn = fn(usize) -> Vec<f32>;

/// Hann window of the given length.
pub fn hann_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window_shape() {
        let w = hann_window(5);
        assert_eq!(w.len(), 5);
        assert!(w[0].abs() < 1e-6);
        assert!((w[2] - 1.0).abs() < 1e-6);
        assert!(w[4].abs() < 1e-6);
        assert!((w[1] - w[3]).abs() < 1e-6);
    }

    #[test]
    fn test_hann_window_degenerate_sizes() {
        assert!(hann_window(0).is_empty());
        assert_eq!(hann_window(1), vec![1.0]);
    }
}
