//! Corpus loading and per-patch example assembly.
//!
//! A corpus is a directory of WAV recordings paired, by file stem, with a
//! directory of silbido annotation files. Opening it decodes every
//! annotation, sizes the patch grid from the audio headers, and classifies
//! positive patches up front; after that each patch is rendered on demand
//! from its grid window.

pub mod export;
pub mod sampler;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::audio::{probe_wave_file, read_wave_file};
use crate::dsp::{extract_frames, render_spectrogram, RenderError};
use crate::grid::{FileSpan, GridError, PatchGridIndex, PatchLocation, PatchParams};
use crate::mask::{expand_mask, render_mask, ExpandParams};
use crate::tonal::{codec, CodecError, Contour};
use crate::types::{AudioSource, MaskTile, RenderParams, SpectrogramTile};

use self::sampler::{BalancedIterable, BalancedView, PositiveSet};

/// Everything needed to open a corpus and render its patches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub render: RenderParams,
    /// Hz, bottom of the rendered band.
    pub min_freq_hz: f64,
    /// Hz, top of the rendered band, clamped per file to Nyquist.
    pub max_freq_hz: f64,
    pub patch: PatchParams,
    /// Rasterized contour line height, in pixels.
    pub line_thickness: usize,
    /// Energy-guided mask widening applied after rasterization, if wanted.
    pub expansion: Option<ExpandParams>,
    /// Extension of the annotation files paired with `.wav` stems.
    pub annotation_ext: String,
    /// Abort open on the first undecodable annotation instead of keeping
    /// the file with zero contours.
    pub fail_fast: bool,
    /// Keep decoded waveforms resident rather than rereading per fetch.
    pub cache_audio: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            render: RenderParams::default(),
            min_freq_hz: 5000.0,
            max_freq_hz: 50000.0,
            patch: PatchParams::default(),
            line_thickness: 1,
            expansion: None,
            annotation_ext: "bin".to_string(),
            fail_fast: false,
            cache_audio: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("no audio file pairs with annotation {}", .annotation.display())]
    MissingAudio { annotation: PathBuf },
    #[error("failed to decode annotation {}: {source}", .path.display())]
    Codec { path: PathBuf, source: CodecError },
    #[error("failed to read audio {}: {source}", .path.display())]
    Audio { path: PathBuf, source: hound::Error },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Indexed access to rendered (spectrogram, mask) pairs.
pub trait PatchProvider {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, id: usize) -> Result<(SpectrogramTile, MaskTile), DatasetError>;
}

/// How waveforms are held between fetches: decoded once and kept resident,
/// or reopened from disk on every access.
enum WaveStore {
    Owned(Vec<AudioSource>),
    OnDemand(Vec<PathBuf>),
}

/// A corpus of annotated recordings exposed as a flat run of patch ids.
pub struct TonalDataset {
    config: DatasetConfig,
    audio_paths: Vec<PathBuf>,
    annotation_paths: Vec<PathBuf>,
    waves: WaveStore,
    contours: Vec<Vec<Contour>>,
    decode_failures: Vec<(PathBuf, CodecError)>,
    grid: PatchGridIndex,
    positives: PositiveSet,
}

impl TonalDataset {
    /// Scan `annotation_dir` recursively, pair each annotation with a `.wav`
    /// of the same stem under `audio_dir`, and build the patch grid over the
    /// paired corpus.
    ///
    /// Pairing is strict: an annotation without a matching recording fails
    /// the whole load rather than being dropped. An annotation that fails to
    /// decode keeps its file in the corpus with zero contours and is listed
    /// in [`decode_failures`](Self::decode_failures), unless
    /// `config.fail_fast` makes it fatal. Annotations are taken in sorted
    /// path order so patch ids are stable across runs.
    pub fn open(
        audio_dir: impl AsRef<Path>,
        annotation_dir: impl AsRef<Path>,
        config: DatasetConfig,
    ) -> Result<Self, DatasetError> {
        let mut wav_by_stem: HashMap<String, PathBuf> = HashMap::new();
        for entry in WalkDir::new(audio_dir.as_ref()) {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();
            if entry.file_type().is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
            {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    wav_by_stem.insert(stem.to_string(), path.to_path_buf());
                }
            }
        }

        let mut annotation_paths = Vec::new();
        for entry in WalkDir::new(annotation_dir.as_ref()) {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();
            if entry.file_type().is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(&config.annotation_ext))
            {
                annotation_paths.push(path.to_path_buf());
            }
        }
        annotation_paths.sort();

        let mut audio_paths = Vec::with_capacity(annotation_paths.len());
        for annotation in &annotation_paths {
            let paired = annotation
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| wav_by_stem.get(stem));
            match paired {
                Some(path) => audio_paths.push(path.clone()),
                None => {
                    return Err(DatasetError::MissingAudio {
                        annotation: annotation.clone(),
                    })
                }
            }
        }

        let mut contours = Vec::with_capacity(annotation_paths.len());
        let mut decode_failures = Vec::new();
        for path in &annotation_paths {
            match codec::read_file(path) {
                Ok(tonal) => contours.push(tonal.into_contours()),
                Err(source) => {
                    if config.fail_fast {
                        return Err(DatasetError::Codec {
                            path: path.clone(),
                            source,
                        });
                    }
                    // The file stays in the corpus with zero contours, so
                    // its patches grade negative.
                    warn!("skipping annotation {}: {source}", path.display());
                    contours.push(Vec::new());
                    decode_failures.push((path.clone(), source));
                }
            }
        }

        let mut spans = Vec::with_capacity(audio_paths.len());
        let mut owned = Vec::new();
        for path in &audio_paths {
            let span = if config.cache_audio {
                let audio = read_wave_file(path).map_err(|source| DatasetError::Audio {
                    path: path.clone(),
                    source,
                })?;
                let span = FileSpan {
                    duration_ms: audio.duration_ms(),
                    sample_rate: audio.sample_rate,
                };
                owned.push(audio);
                span
            } else {
                // Header probe only; the waveform is reread per fetch anyway.
                let info = probe_wave_file(path).map_err(|source| DatasetError::Audio {
                    path: path.clone(),
                    source,
                })?;
                FileSpan {
                    duration_ms: info.duration_ms,
                    sample_rate: info.sample_rate,
                }
            };
            spans.push(span);
        }
        let waves = if config.cache_audio {
            WaveStore::Owned(owned)
        } else {
            WaveStore::OnDemand(audio_paths.clone())
        };

        let grid = PatchGridIndex::new(
            &config.render,
            &config.patch,
            config.min_freq_hz,
            config.max_freq_hz,
            &spans,
        );
        let positives = PositiveSet::build(&grid, &contours);
        info!(
            "opened corpus: {} files ({} annotations skipped), {} patches ({} positive)",
            annotation_paths.len(),
            decode_failures.len(),
            grid.total_patches(),
            positives.len()
        );

        Ok(TonalDataset {
            config,
            audio_paths,
            annotation_paths,
            waves,
            contours,
            decode_failures,
            grid,
            positives,
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn grid(&self) -> &PatchGridIndex {
        &self.grid
    }

    pub fn positives(&self) -> &PositiveSet {
        &self.positives
    }

    pub fn num_files(&self) -> usize {
        self.annotation_paths.len()
    }

    pub fn audio_path(&self, file_idx: usize) -> &Path {
        &self.audio_paths[file_idx]
    }

    pub fn annotation_path(&self, file_idx: usize) -> &Path {
        &self.annotation_paths[file_idx]
    }

    pub fn contours(&self, file_idx: usize) -> &[Contour] {
        &self.contours[file_idx]
    }

    /// Annotations that failed to decode and were kept as contour-less
    /// files. Empty when the corpus opened clean or with `fail_fast` set.
    pub fn decode_failures(&self) -> &[(PathBuf, CodecError)] {
        &self.decode_failures
    }

    /// Class-balanced shuffled view over this corpus.
    pub fn balanced_view(&self, proportion: f64, seed: Option<u64>) -> BalancedView<'_, Self> {
        BalancedView::new(self, &self.positives, proportion, seed)
    }

    /// Alternating positive/negative draw schedule over this corpus.
    pub fn balanced_iterable(
        &self,
        epoch_size: Option<usize>,
        seed: Option<u64>,
    ) -> BalancedIterable {
        BalancedIterable::new(self, &self.positives, epoch_size, seed)
    }

    fn render_patch(
        &self,
        audio: &AudioSource,
        location: &PatchLocation,
    ) -> Result<(SpectrogramTile, MaskTile), DatasetError> {
        let frames = extract_frames(
            audio,
            &self.config.render,
            location.window.start_time_ms,
            location.window.end_time_ms,
            None,
        );
        let spectrogram = render_spectrogram(&frames, &self.config.render, &location.window)?;
        let mut mask = render_mask(
            &self.contours[location.file_idx],
            &self.config.render,
            &location.window,
            self.config.line_thickness,
        );
        if let Some(expansion) = &self.config.expansion {
            mask = expand_mask(&mask, &spectrogram, expansion);
        }
        Ok((spectrogram, mask))
    }
}

impl PatchProvider for TonalDataset {
    fn len(&self) -> usize {
        self.grid.total_patches()
    }

    fn get(&self, id: usize) -> Result<(SpectrogramTile, MaskTile), DatasetError> {
        let location = self.grid.lookup(id)?;
        match &self.waves {
            WaveStore::Owned(audio) => self.render_patch(&audio[location.file_idx], &location),
            WaveStore::OnDemand(paths) => {
                let path = &paths[location.file_idx];
                let audio = read_wave_file(path).map_err(|source| DatasetError::Audio {
                    path: path.clone(),
                    source,
                })?;
                self.render_patch(&audio, &location)
            }
        }
    }
}
