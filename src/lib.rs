//! Whistle-detection training data from annotated recordings.
//!
//! Pairs WAV audio with silbido tonal annotation files and serves
//! fixed-size (spectrogram, mask) patch examples addressable by a flat
//! integer id. The pieces compose bottom-up: a bit-exact codec for the
//! silbido binary format, waveform framing and FFT rendering, contour
//! rasterization with optional energy-guided widening, a patch-grid index
//! over the whole corpus, and class-balanced samplers on top.

pub mod audio;
pub mod dataset;
pub mod dsp;
pub mod grid;
pub mod mask;
pub mod tonal;
pub mod types;

pub use dataset::{DatasetConfig, DatasetError, PatchProvider, TonalDataset};
pub use types::{AudioSource, MaskTile, RenderParams, Scale, SpectrogramTile, TimeFreqWindow};
