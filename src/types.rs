use serde::{Deserialize, Serialize};

/// Decoded waveform as handed to the rendering pipeline.
///
/// Samples are mono and kept at integer converter scale (a 16-bit file
/// yields values in ±32768); `bit_depth` names that scale, and framing
/// rescales anything wider down to 16-bit range. The default spectrogram
/// clip range assumes this convention, so loaders must not hand over
/// ±1 floats.
#[derive(Clone, Debug)]
pub struct AudioSource {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub bit_depth: u16,
}

impl AudioSource {
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// Output scaling for rendered spectrograms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scale {
    /// Clip log magnitudes to `[clip_min, clip_max]`, rescale to `[0, 1]`.
    Normalized,
    /// Return `20 * log10(magnitude)` without clipping.
    Decibel,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderParams {
    pub frame_time_span_ms: f64, // DFT window length
    pub step_time_span_ms: f64,  // hop between frames
    pub clip_min: f32,           // log10 units, Normalized mode only
    pub clip_max: f32,
    pub scale: Scale,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            frame_time_span_ms: 8.0,
            step_time_span_ms: 2.0,
            clip_min: 0.0,
            clip_max: 6.0,
            scale: Scale::Normalized,
        }
    }
}

impl RenderParams {
    /// Width of one frequency bin in Hz. An 8 ms frame gives 125 Hz bins.
    pub fn freq_resolution(&self) -> f64 {
        1000.0 / self.frame_time_span_ms
    }
}

/// One rectangular time-frequency region of a recording.
/// Time bounds are half-open `[start, end)` milliseconds from file start;
/// frequency bounds are half-open `[min, max)` Hz.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeFreqWindow {
    pub start_time_ms: f64,
    pub end_time_ms: f64,
    pub min_freq_hz: f64,
    pub max_freq_hz: f64,
}

impl TimeFreqWindow {
    pub fn time_span_ms(&self) -> f64 {
        self.end_time_ms - self.start_time_ms
    }
}

/// Scaled-magnitude spectrogram over one window.
///
/// Row-major, `height` frequency rows by `width` time columns, row 0 holding
/// the highest selected frequency. `actual_end_time_ms` is how far the render
/// really reached; it falls short of the requested end when the waveform ran
/// out of frames.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectrogramTile {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
    pub actual_end_time_ms: f64,
}

impl SpectrogramTile {
    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.width + col]
    }
}

/// Annotation mask with the same shape conventions as its paired
/// [`SpectrogramTile`]. Rasterization writes 0/1; expansion keeps it a
/// presence indicator.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskTile {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

impl MaskTile {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width * height],
        }
    }

    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.width + col]
    }

    /// Number of set pixels.
    pub fn set_count(&self) -> usize {
        self.values.iter().filter(|&&v| v != 0.0).count()
    }
}
