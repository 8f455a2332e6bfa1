//! Patch-grid indexing across a corpus.
//!
//! Every audio file is carved into a virtual grid of fixed-size patches, and
//! the grids of all files are concatenated into one flat id space. The index
//! is built once at corpus load and answers id lookups with the exact
//! time/frequency window to render, so a patch id alone identifies one
//! training example.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{RenderParams, TimeFreqWindow};

/// Patch shape and stride, counted in spectrogram time frames and
/// frequency bins. Advances default to the patch lengths, giving
/// non-overlapping patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchParams {
    pub time_patch_frames: usize,
    pub freq_patch_frames: usize,
    pub time_patch_advance: usize,
    pub freq_patch_advance: usize,
}

impl Default for PatchParams {
    fn default() -> Self {
        PatchParams {
            time_patch_frames: 64,
            freq_patch_frames: 64,
            time_patch_advance: 64,
            freq_patch_advance: 64,
        }
    }
}

/// Patch shape and stride converted to physical units.
#[derive(Debug, Clone, Copy)]
pub struct PatchGeometry {
    pub time_patch_len_ms: f64,
    pub time_patch_adv_ms: f64,
    pub freq_patch_len_hz: f64,
    pub freq_patch_adv_hz: f64,
}

impl PatchGeometry {
    pub fn new(render: &RenderParams, patch: &PatchParams) -> Self {
        let res = render.freq_resolution();
        PatchGeometry {
            time_patch_len_ms: render.step_time_span_ms * patch.time_patch_frames as f64,
            time_patch_adv_ms: render.step_time_span_ms * patch.time_patch_advance as f64,
            freq_patch_len_hz: res * patch.freq_patch_frames as f64,
            freq_patch_adv_hz: res * patch.freq_patch_advance as f64,
        }
    }
}

/// Length and sample rate of one corpus file, all the grid needs per file.
#[derive(Debug, Clone, Copy)]
pub struct FileSpan {
    pub duration_ms: f64,
    pub sample_rate: u32,
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("patch id {id} out of range for grid of {total} patches")]
    IndexOutOfRange { id: usize, total: usize },
}

/// A resolved patch id: the owning file plus the window to render.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchLocation {
    pub file_idx: usize,
    pub time_division: usize,
    pub freq_division: usize,
    pub window: TimeFreqWindow,
}

#[derive(Debug, Clone, Copy)]
struct FileGrid {
    num_time_divisions: usize,
    num_freq_divisions: usize,
}

/// Immutable id ⇄ (file, time window, frequency window) mapping.
///
/// Ids within one file are time-major: consecutive ids step through time
/// divisions first, then move up one frequency division. Files contribute
/// their patch counts to an inclusive prefix-sum array, so resolving an id's
/// owner is a binary search.
#[derive(Debug, Clone)]
pub struct PatchGridIndex {
    files: Vec<FileGrid>,
    cumulative: Vec<usize>,
    geometry: PatchGeometry,
    min_freq_hz: f64,
    max_freq_hz: f64,
}

impl PatchGridIndex {
    /// Build the grid for a corpus. A file too short for one patch, or a
    /// band too narrow for one (after clamping to the file's Nyquist
    /// frequency), contributes zero patches rather than failing.
    pub fn new(
        render: &RenderParams,
        patch: &PatchParams,
        min_freq_hz: f64,
        max_freq_hz: f64,
        files: &[FileSpan],
    ) -> Self {
        let geometry = PatchGeometry::new(render, patch);
        let mut grids = Vec::with_capacity(files.len());
        let mut cumulative = Vec::with_capacity(files.len());
        let mut total = 0usize;
        for span in files {
            let band_top = max_freq_hz.min(span.sample_rate as f64 / 2.0);
            let nfd = ((band_top - min_freq_hz - geometry.freq_patch_len_hz)
                / geometry.freq_patch_adv_hz)
                .floor()
                + 1.0;
            let ntd = ((span.duration_ms - geometry.time_patch_len_ms - render.frame_time_span_ms)
                / geometry.time_patch_adv_ms)
                .floor()
                + 1.0;
            let grid = FileGrid {
                num_time_divisions: ntd.max(0.0) as usize,
                num_freq_divisions: nfd.max(0.0) as usize,
            };
            total += grid.num_time_divisions * grid.num_freq_divisions;
            grids.push(grid);
            cumulative.push(total);
        }
        PatchGridIndex {
            files: grids,
            cumulative,
            geometry,
            min_freq_hz,
            max_freq_hz,
        }
    }

    pub fn total_patches(&self) -> usize {
        self.cumulative.last().copied().unwrap_or(0)
    }

    pub fn num_files(&self) -> usize {
        self.files.len()
    }

    /// (time divisions, frequency divisions) of one file's grid.
    pub fn divisions(&self, file_idx: usize) -> (usize, usize) {
        let grid = self.files[file_idx];
        (grid.num_time_divisions, grid.num_freq_divisions)
    }

    /// Number of ids owned by files preceding `file_idx`.
    pub fn file_base(&self, file_idx: usize) -> usize {
        if file_idx == 0 {
            0
        } else {
            self.cumulative[file_idx - 1]
        }
    }

    pub fn geometry(&self) -> &PatchGeometry {
        &self.geometry
    }

    pub fn min_freq_hz(&self) -> f64 {
        self.min_freq_hz
    }

    pub fn max_freq_hz(&self) -> f64 {
        self.max_freq_hz
    }

    /// Resolve a global id to its file and render window.
    pub fn lookup(&self, id: usize) -> Result<PatchLocation, GridError> {
        let total = self.total_patches();
        if id >= total {
            return Err(GridError::IndexOutOfRange { id, total });
        }

        // First file whose inclusive boundary exceeds the id. Zero-patch
        // files share a boundary with their predecessor and are never
        // selected.
        let file_idx = self.cumulative.partition_point(|&c| c <= id);
        let local = id - self.file_base(file_idx);
        let grid = self.files[file_idx];
        let time_division = local % grid.num_time_divisions;
        let freq_division = local / grid.num_time_divisions;

        let start_time_ms = time_division as f64 * self.geometry.time_patch_adv_ms;
        let start_freq_hz =
            self.min_freq_hz + freq_division as f64 * self.geometry.freq_patch_adv_hz;
        Ok(PatchLocation {
            file_idx,
            time_division,
            freq_division,
            window: TimeFreqWindow {
                start_time_ms,
                end_time_ms: start_time_ms + self.geometry.time_patch_len_ms,
                min_freq_hz: start_freq_hz,
                max_freq_hz: start_freq_hz + self.geometry.freq_patch_len_hz,
            },
        })
    }

    /// Forward mapping: the global id of one grid cell, or `None` when the
    /// cell lies outside the file's grid.
    pub fn global_id(
        &self,
        file_idx: usize,
        time_division: usize,
        freq_division: usize,
    ) -> Option<usize> {
        let grid = self.files.get(file_idx)?;
        if time_division >= grid.num_time_divisions || freq_division >= grid.num_freq_divisions {
            return None;
        }
        Some(self.file_base(file_idx) + time_division + freq_division * grid.num_time_divisions)
    }
}
