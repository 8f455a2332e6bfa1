//! Waveform framing for the short-time Fourier transform.

use super::WindowFn;
use crate::types::{AudioSource, RenderParams};

/// Overlapping fixed-length sample windows over one time range.
///
/// Row-major: `count` frames of `frame_len` samples each. Ephemeral; built
/// per render and never persisted.
#[derive(Clone, Debug)]
pub struct FrameSet {
    pub frame_len: usize,
    pub count: usize,
    pub data: Vec<f32>,
}

impl FrameSet {
    pub fn empty(frame_len: usize) -> Self {
        Self {
            frame_len,
            count: 0,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn frame(&self, i: usize) -> &[f32] {
        &self.data[i * self.frame_len..(i + 1) * self.frame_len]
    }
}

/// Slice `[start_time_ms, end_time_ms)` of the waveform into overlapping
/// frames of `frame_time_span_ms`, hopping `step_time_span_ms`.
///
/// The hop is kept real-valued; frame i starts at `round(i * step)` samples
/// rather than at multiples of a rounded step. The slice is sized to hold
/// `floor(range / step)` whole frames, reaching one frame length past the
/// last hop, so a range the recording fully covers always yields the column
/// count its annotation mask is sized to. Samples wider than 16 bits are
/// floor-divided down to 16-bit range first.
///
/// A range running past the end of the recording is clamped; frames that no
/// longer fit are dropped, down to an empty set rather than an error.
/// Callers that require at least one frame report that themselves.
pub fn extract_frames(
    audio: &AudioSource,
    params: &RenderParams,
    start_time_ms: f64,
    end_time_ms: f64,
    window_fn: Option<WindowFn>,
) -> FrameSet {
    let rate = audio.sample_rate as f64;
    let frame_len = (params.frame_time_span_ms / 1000.0 * rate).floor() as usize;
    let step = params.step_time_span_ms / 1000.0 * rate;

    if frame_len == 0 || step <= 0.0 {
        return FrameSet::empty(frame_len);
    }

    let len = audio.samples.len();
    let start_sample = ((start_time_ms / 1000.0 * rate) as usize).min(len);
    let wanted = ((end_time_ms - start_time_ms) / params.step_time_span_ms).floor();
    if wanted < 1.0 {
        return FrameSet::empty(frame_len);
    }
    // Sized for the last wanted frame's rounded offset; extending the range
    // in milliseconds instead can fall one sample short when the hop is a
    // fractional sample count.
    let needed = (((wanted - 1.0) * step).round() as usize).saturating_add(frame_len);
    let end_sample = start_sample.saturating_add(needed).min(len);
    let slice = &audio.samples[start_sample..end_sample];

    if slice.len() < frame_len {
        return FrameSet::empty(frame_len);
    }

    // Right-shift equivalent for 24- and 32-bit sources.
    let rescale = if audio.bit_depth > 16 {
        let bytes = (audio.bit_depth as i32 + 7) / 8;
        Some(2f32.powi(8 * (bytes - 2)))
    } else {
        None
    };

    let mut data =
        Vec::with_capacity(((slice.len() - frame_len) as f64 / step) as usize * frame_len);
    let mut count = 0;
    let mut i = 0u64;
    loop {
        let offset = (i as f64 * step).round() as usize;
        if offset + frame_len > slice.len() {
            break;
        }
        let frame = &slice[offset..offset + frame_len];
        match rescale {
            Some(div) => data.extend(frame.iter().map(|&s| (s / div).floor())),
            None => data.extend_from_slice(frame),
        }
        count += 1;
        i += 1;
    }

    let mut frames = FrameSet {
        frame_len,
        count,
        data,
    };

    if let Some(window_fn) = window_fn {
        let weights = window_fn(frame_len);
        for frame in frames.data.chunks_mut(frame_len) {
            for (s, w) in frame.iter_mut().zip(&weights) {
                *s *= w;
            }
        }
    }

    frames
}
